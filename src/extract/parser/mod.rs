//! Format-aware parsers used by the structured extraction strategy.
//!
//! Each supported format implements `ContentParser` and produces a flat list
//! of heading and paragraph blocks. `parser_for()` returns the parser for a
//! format, or `None` when the format has no textual structure (images).

pub mod epub;
pub mod html;
pub mod pdf;

use crate::analysis::text::{heading_text, is_marked_heading, looks_like_heading};
use crate::extract::error::ExtractResult;
use crate::extract::format::ContentFormat;

/// One structural block of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextBlock {
    Heading(String),
    Paragraph(String),
}

/// Output of a format parser.
#[derive(Debug, Clone, Default)]
pub struct ParsedText {
    pub title: Option<String>,
    pub blocks: Vec<TextBlock>,
    pub page_count: Option<usize>,
}

impl ParsedText {
    /// Render blocks as plain text: one block per paragraph, headings on
    /// their own line, blank lines between blocks.
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|b| match b {
                TextBlock::Heading(h) | TextBlock::Paragraph(h) => h.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn word_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match b {
                TextBlock::Heading(t) | TextBlock::Paragraph(t) => t.split_whitespace().count(),
            })
            .sum()
    }

    /// First heading, used as a title fallback.
    pub fn first_heading(&self) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            TextBlock::Heading(h) => Some(h.as_str()),
            TextBlock::Paragraph(_) => None,
        })
    }
}

/// Trait for format-specific document parsers.
pub trait ContentParser: Send + Sync {
    /// Parse raw bytes into heading and paragraph blocks.
    fn parse(&self, data: &[u8]) -> ExtractResult<ParsedText>;

    /// The format this parser handles.
    fn format(&self) -> ContentFormat;
}

/// Get the parser for a content format.
pub fn parser_for(format: ContentFormat) -> Option<Box<dyn ContentParser>> {
    match format {
        ContentFormat::Html => Some(Box::new(html::HtmlParser)),
        ContentFormat::Pdf => Some(Box::new(pdf::PdfParser)),
        ContentFormat::Epub => Some(Box::new(epub::EpubParser)),
        ContentFormat::PlainText => Some(Box::new(PlainTextParser)),
        ContentFormat::Image => None,
    }
}

/// Join wrapped lines of one paragraph into a single line, rejoining words
/// hyphenated at the line break.
pub(crate) fn reflow_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(line);
            continue;
        }
        let continues_lower = line.chars().next().is_some_and(|c| c.is_lowercase());
        if out.ends_with('-') && continues_lower {
            out.pop();
        } else {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

/// Split a block of text into heading and paragraph blocks.
///
/// Paragraphs are separated by blank lines. A single-line paragraph shaped
/// like a heading becomes a heading; a marked heading (`#`, "Chapter 2", all
/// caps) on the first line of a paragraph is split off from the body.
pub(crate) fn blocks_from_text(text: &str) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    let normalized = text.replace("\r\n", "\n");
    for para in normalized.split("\n\n") {
        let lines: Vec<&str> = para
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let Some((first, rest)) = lines.split_first() else {
            continue;
        };
        if rest.is_empty() && looks_like_heading(first) {
            blocks.push(TextBlock::Heading(heading_text(first)));
            continue;
        }
        let body = if is_marked_heading(first) {
            blocks.push(TextBlock::Heading(heading_text(first)));
            rest
        } else {
            &lines[..]
        };
        let joined = reflow_lines(body.iter().copied());
        if !joined.is_empty() {
            blocks.push(TextBlock::Paragraph(joined));
        }
    }
    blocks
}

/// Plain text and markdown: paragraphs on blank lines, heading lines kept.
struct PlainTextParser;

impl ContentParser for PlainTextParser {
    fn format(&self) -> ContentFormat {
        ContentFormat::PlainText
    }

    fn parse(&self, data: &[u8]) -> ExtractResult<ParsedText> {
        let text = String::from_utf8_lossy(data);
        let blocks = blocks_from_text(&text);
        let title = blocks.iter().find_map(|b| match b {
            TextBlock::Heading(h) => Some(h.clone()),
            TextBlock::Paragraph(_) => None,
        });
        Ok(ParsedText {
            title,
            blocks,
            page_count: None,
        })
    }
}
