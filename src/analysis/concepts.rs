//! Concept extraction: weighted term vectors per chunk.
//!
//! A term's weight is its relative frequency within the chunk, scaled by
//! `ln(1 + N / df)` where `N` is the number of chunks and `df` the number of
//! chunks containing the term, then multiplied by the genre's boost for the
//! term's kind. Multi-word capitalized names are merged in as entities.
//! Only the heaviest `k` terms survive, rescaled so the top term weighs 1.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

use crate::analysis::genre::Genre;
use crate::analysis::text::{capitalized_sequences, content_words, is_procedural, is_stopword, is_temporal};
use crate::model::{Chunk, ConceptKind, ConceptVector, ConceptWeight};

/// Raw term counts of one chunk.
#[derive(Debug, Default)]
struct TermCounts {
    counts: BTreeMap<String, (usize, ConceptKind)>,
    total: usize,
}

impl TermCounts {
    fn add(&mut self, term: String, kind: ConceptKind) {
        let slot = self.counts.entry(term).or_insert((0, kind));
        slot.0 += 1;
        if kind == ConceptKind::Entity {
            slot.1 = kind;
        }
        self.total += 1;
    }
}

fn term_kind(term: &str) -> ConceptKind {
    if is_temporal(term) {
        ConceptKind::Temporal
    } else if is_procedural(term) {
        ConceptKind::Procedural
    } else {
        ConceptKind::Term
    }
}

fn count_terms(text: &str) -> TermCounts {
    let mut counts = TermCounts::default();
    for word in content_words(text) {
        let kind = term_kind(&word);
        counts.add(word, kind);
    }

    for name in capitalized_sequences(text) {
        let lowered = name.to_lowercase();
        let words: Vec<&str> = lowered
            .split_whitespace()
            .filter(|w| !is_stopword(w))
            .collect();
        match words.as_slice() {
            [] => {}
            // Single non-initial capitalized word: the plain term becomes an
            // entity if it was counted at all.
            [single] => {
                if let Some(slot) = counts.counts.get_mut(*single) {
                    slot.1 = ConceptKind::Entity;
                }
            }
            many => counts.add(many.join(" "), ConceptKind::Entity),
        }
    }
    counts
}

/// Compute concept vectors for every chunk in place.
///
/// Runs chunk-parallel on the current rayon pool; the result does not depend
/// on scheduling.
pub fn extract_concepts(chunks: &mut [Chunk], genre: Genre, per_chunk: usize) {
    let counts: Vec<TermCounts> = chunks.par_iter().map(|c| count_terms(&c.text)).collect();

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for chunk_counts in &counts {
        for term in chunk_counts.counts.keys() {
            *document_frequency.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    let n = chunks.len().max(1) as f64;
    let boosts = genre.profile().boosts;
    let vectors: Vec<ConceptVector> = counts
        .par_iter()
        .map(|chunk_counts| {
            let total = chunk_counts.total.max(1) as f64;
            let entries = chunk_counts.counts.iter().map(|(term, &(count, kind))| {
                let df = document_frequency.get(term.as_str()).copied().unwrap_or(1) as f64;
                let tf = count as f64 / total;
                let idf = (1.0 + n / df).ln();
                ConceptWeight {
                    term: term.clone(),
                    weight: tf * idf * boosts.for_kind(kind),
                    kind,
                }
            });
            let mut vector = ConceptVector::from_entries(entries);
            vector.truncate(per_chunk);
            vector.normalize_max();
            vector
        })
        .collect();

    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.concepts = vector;
    }
    tracing::debug!(chunks = chunks.len(), genre = %genre, per_chunk, "concepts extracted");
}
