//! EPUB parser using the `epub` crate.
//!
//! Spine items are read in order; their XHTML content is parsed with
//! `scraper` the same way as standalone HTML.

use std::io::Cursor;

use scraper::Html;

use crate::extract::error::{ExtractError, ExtractResult};
use crate::extract::format::ContentFormat;
use crate::extract::parser::html::extract_blocks;
use crate::extract::parser::{ContentParser, ParsedText, TextBlock};

/// EPUB document parser backed by the `epub` crate + `scraper` for content.
pub struct EpubParser;

impl ContentParser for EpubParser {
    fn format(&self) -> ContentFormat {
        ContentFormat::Epub
    }

    fn parse(&self, data: &[u8]) -> ExtractResult<ParsedText> {
        let cursor = Cursor::new(data.to_vec());
        let mut doc =
            epub::doc::EpubDoc::from_reader(cursor).map_err(|e| ExtractError::ParseError {
                format: "epub".into(),
                message: e.to_string(),
            })?;

        let title = doc.mdata("title").map(|m| m.value.clone());
        let num_chapters = doc.get_num_chapters();
        let mut blocks = Vec::new();

        for chapter_idx in 0..num_chapters {
            doc.set_current_chapter(chapter_idx);
            let Some((content, _mime)) = doc.get_current_str() else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            let html = Html::parse_document(&content);
            blocks.extend(extract_blocks(&html));
        }

        if blocks.iter().all(|b| matches!(b, TextBlock::Heading(_))) {
            tracing::debug!(chapters = num_chapters, "epub spine carried no paragraph text");
        }

        Ok(ParsedText {
            title,
            blocks,
            page_count: Some(num_chapters),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_invalid_epub_returns_error() {
        let result = EpubParser.parse(b"This is not an EPUB");
        assert!(matches!(result, Err(ExtractError::ParseError { .. })));
    }
}
