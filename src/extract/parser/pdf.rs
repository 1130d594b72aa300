//! PDF parser using the `pdf-extract` crate.
//!
//! `pdf-extract` returns all pages as one string with form feeds between
//! pages. Pages are split on those, then into paragraphs on blank lines, and
//! wrapped lines are rejoined.

use crate::extract::error::{ExtractError, ExtractResult};
use crate::extract::format::ContentFormat;
use crate::extract::parser::{ContentParser, ParsedText, TextBlock, blocks_from_text};

/// PDF document parser backed by `pdf-extract`.
pub struct PdfParser;

impl ContentParser for PdfParser {
    fn format(&self) -> ContentFormat {
        ContentFormat::Pdf
    }

    fn parse(&self, data: &[u8]) -> ExtractResult<ParsedText> {
        let text = extract_pdf_text(data)?;
        Ok(parse_pages(&text))
    }
}

/// Raw text of every page, form-feed separated.
pub(crate) fn extract_pdf_text(data: &[u8]) -> ExtractResult<String> {
    pdf_extract::extract_text_from_mem(data).map_err(|e| ExtractError::ParseError {
        format: "pdf".into(),
        message: e.to_string(),
    })
}

/// Number of non-empty pages in form-feed separated text.
pub(crate) fn page_count(text: &str) -> usize {
    text.split('\x0C').filter(|p| !p.trim().is_empty()).count()
}

/// Turn form-feed separated page text into blocks.
///
/// Page headers and footers that are bare page numbers are dropped.
pub(crate) fn parse_pages(text: &str) -> ParsedText {
    let mut blocks = Vec::new();
    for page in text.split('\x0C') {
        for block in blocks_from_text(page) {
            let is_page_number = matches!(&block, TextBlock::Heading(t) | TextBlock::Paragraph(t)
                if t.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()));
            if !is_page_number {
                blocks.push(block);
            }
        }
    }

    let title = blocks.iter().find_map(|b| match b {
        TextBlock::Heading(h) => Some(h.clone()),
        TextBlock::Paragraph(_) => None,
    });

    ParsedText {
        title,
        blocks,
        page_count: Some(page_count(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_invalid_pdf_returns_error() {
        let result = PdfParser.parse(b"This is not a PDF");
        assert!(matches!(result, Err(ExtractError::ParseError { .. })));
    }

    #[test]
    fn pages_split_and_page_numbers_dropped() {
        let text = "Introduction\n\nThe system re-\nquires setup.\n\n1\x0CSecond page text\ncontinues here.\n\n2";
        let parsed = parse_pages(text);
        assert_eq!(parsed.page_count, Some(2));
        assert_eq!(parsed.title.as_deref(), Some("Introduction"));
        assert_eq!(
            parsed.blocks,
            vec![
                TextBlock::Heading("Introduction".into()),
                TextBlock::Paragraph("The system requires setup.".into()),
                TextBlock::Paragraph("Second page text continues here.".into()),
            ]
        );
    }
}
