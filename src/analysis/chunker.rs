//! Content-aware chunking.
//!
//! Text is first split into sentences with byte spans. Paragraph breaks and
//! heading lines always end a sentence; `.`, `!` and `?` end one when the
//! next word does not start in lowercase and the word before is not a known
//! abbreviation. Chunks are then cut at the sentence boundary closest to
//! each `k * total / N` mark, so every chunk holds whole sentences and the
//! last chunk absorbs the remainder.

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::text::{first_words, heading_text, is_marked_heading, looks_like_heading};
use crate::config::MAX_CHUNKS_LIMIT;
use crate::model::{Chunk, ChunkFeatures, ChunkId, ChunkingReport, ConceptVector, DocumentId};

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "vs", "etc", "e.g", "i.e", "cf", "fig", "no", "vol",
    "approx", "jr", "sr",
];

const CLOSERS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', ')', ']'];

/// A sentence as a byte span of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
    /// The sentence is a heading line.
    pub heading: bool,
}

/// Split `text` into sentences.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut out = Vec::new();
    for (ps, pe) in paragraph_spans(text) {
        let para = &text[ps..pe];
        let first_line_end = para.find('\n').map(|i| ps + i).unwrap_or(pe);
        let single_line = first_line_end == pe;
        let first_line = &text[ps..first_line_end];

        if single_line && looks_like_heading(first_line) {
            out.push(Sentence {
                start: ps,
                end: pe,
                heading: true,
            });
            continue;
        }
        let body_start = if is_marked_heading(first_line) {
            out.push(Sentence {
                start: ps,
                end: first_line_end,
                heading: true,
            });
            first_line_end
        } else {
            ps
        };
        split_prose(text, body_start, pe, &mut out);
    }
    out
}

/// Non-blank paragraph spans, trimmed.
fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                spans.extend(trim_span(text, s, offset));
            }
        } else if start.is_none() {
            start = Some(offset);
        }
        offset += line.len();
    }
    if let Some(s) = start {
        spans.extend(trim_span(text, s, text.len()));
    }
    spans
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some((start + lead, start + lead + trimmed.len()))
    }
}

/// Split `text[start..end]` on sentence punctuation.
fn split_prose(text: &str, start: usize, end: usize, out: &mut Vec<Sentence>) {
    let segment = &text[start..end];
    let mut sentence_start = start;
    let mut chars = segment.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        // Swallow closing quotes and brackets right after the punctuation.
        let mut boundary = start + i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if CLOSERS.contains(&next) {
                boundary = start + j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if boundary >= end {
            break;
        }
        let rest = &text[boundary..end];
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let next_word = rest.trim_start().chars().next();
        if next_word.is_some_and(|n| n.is_lowercase()) {
            continue;
        }
        if c == '.' && ends_with_abbreviation(&text[sentence_start..start + i]) {
            continue;
        }
        out.extend(trim_span(text, sentence_start, boundary).map(|(s, e)| Sentence {
            start: s,
            end: e,
            heading: false,
        }));
        sentence_start = boundary;
    }

    out.extend(trim_span(text, sentence_start, end).map(|(s, e)| Sentence {
        start: s,
        end: e,
        heading: false,
    }));
}

fn ends_with_abbreviation(before: &str) -> bool {
    let Some(word) = before.split_whitespace().last() else {
        return false;
    };
    let word = word.trim_start_matches(['(', '"', '\'']).to_lowercase();
    // Single initials ("J. Smith").
    if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) {
        return true;
    }
    ABBREVIATIONS.contains(&word.as_str())
}

/// Cut `sentences` into `n` groups of consecutive sentences whose byte
/// lengths are as even as sentence boundaries allow.
///
/// Returns the index of the first sentence of every group. Requires
/// `1 <= n <= sentences.len()`.
pub fn plan_cuts(sentences: &[Sentence], n: usize) -> Vec<usize> {
    let count = sentences.len();
    let mut cumulative = Vec::with_capacity(count + 1);
    cumulative.push(0usize);
    for s in sentences {
        let last = cumulative.last().copied().unwrap_or(0);
        cumulative.push(last + (s.end - s.start));
    }
    let total = cumulative[count] as f64;

    let mut starts = vec![0usize];
    let mut prev = 0usize;
    for k in 1..n {
        let target = total * k as f64 / n as f64;
        // Leave at least one sentence for every remaining chunk.
        let lo = prev + 1;
        let hi = count - (n - k);
        let mut best = lo;
        let mut best_dist = f64::INFINITY;
        for b in lo..=hi {
            let dist = (cumulative[b] as f64 - target).abs();
            if dist < best_dist {
                best = b;
                best_dist = dist;
            }
        }
        starts.push(best);
        prev = best;
    }
    starts
}

/// Split a document's text into at most `max_chunks` chunks.
///
/// Concept vectors are left empty; the concept extractor fills them.
pub fn chunk_document(
    document: DocumentId,
    text: &str,
    max_chunks: usize,
    title_words: usize,
) -> AnalysisResult<(Vec<Chunk>, ChunkingReport)> {
    if !(1..=MAX_CHUNKS_LIMIT).contains(&max_chunks) {
        return Err(AnalysisError::InvalidChunkCount {
            requested: max_chunks,
        });
    }
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Err(AnalysisError::EmptyText);
    }

    let n = max_chunks.min(sentences.len());
    let starts = plan_cuts(&sentences, n);

    let mut chunks = Vec::with_capacity(n);
    for (ordinal, &first) in starts.iter().enumerate() {
        let last = starts.get(ordinal + 1).copied().unwrap_or(sentences.len());
        let group = &sentences[first..last];
        let start = group[0].start;
        let end = group[group.len() - 1].end;
        let body = &text[start..end];
        let title = group
            .iter()
            .find(|s| s.heading)
            .map(|s| heading_text(&text[s.start..s.end]))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| first_words(body, title_words));
        let ordinal = ordinal as u32;
        chunks.push(Chunk {
            id: ChunkId::new(document, ordinal),
            ordinal,
            start,
            end,
            text: body.to_string(),
            title,
            word_count: body.split_whitespace().count(),
            concepts: ConceptVector::new(),
            genre: None,
            features: ChunkFeatures::default(),
        });
    }

    let report = ChunkingReport {
        requested: max_chunks,
        produced: chunks.len(),
        reduced: chunks.len() < max_chunks,
    };
    if report.reduced {
        tracing::debug!(
            requested = max_chunks,
            produced = report.produced,
            "fewer sentences than requested chunks"
        );
    }
    Ok((chunks, report))
}
