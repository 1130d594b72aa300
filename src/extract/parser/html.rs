//! HTML parser using the `scraper` crate.
//!
//! Extracts `<title>`, headings (`<h1>`–`<h6>`) and paragraph-like elements
//! in document order.

use scraper::{Html, Selector};

use crate::analysis::text::is_marked_heading;
use crate::extract::error::ExtractResult;
use crate::extract::format::ContentFormat;
use crate::extract::parser::{ContentParser, ParsedText, TextBlock};

/// HTML document parser backed by `scraper` (servo's html5ever).
pub struct HtmlParser;

impl ContentParser for HtmlParser {
    fn format(&self) -> ContentFormat {
        ContentFormat::Html
    }

    fn parse(&self, data: &[u8]) -> ExtractResult<ParsedText> {
        let text = String::from_utf8_lossy(data);
        let document = Html::parse_document(&text);

        let blocks = extract_blocks(&document);
        let title = extract_title(&document).or_else(|| {
            blocks.iter().find_map(|b| match b {
                TextBlock::Heading(h) => Some(h.clone()),
                TextBlock::Paragraph(_) => None,
            })
        });

        Ok(ParsedText {
            title,
            blocks,
            page_count: None,
        })
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    document
        .select(&sel)
        .next()
        .map(|el| collapse(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Walk the DOM and collect headings and paragraph blocks in document order.
///
/// Nested matches (a `<p>` inside a `<li>`) would repeat text, so an element
/// is skipped when one of its ancestors already matched.
pub(crate) fn extract_blocks(document: &Html) -> Vec<TextBlock> {
    let content_selector =
        Selector::parse("h1, h2, h3, h4, h5, h6, p, li, blockquote, pre, td, dd")
            .expect("static selector must parse");

    let mut blocks = Vec::new();
    for el in document.select(&content_selector) {
        let nested = el.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                matches!(e.name(), "p" | "li" | "blockquote" | "pre" | "td" | "dd")
            })
        });
        if nested {
            continue;
        }

        let text = collapse(&el.text().collect::<String>());
        if text.is_empty() {
            continue;
        }

        let tag = el.value().name();
        let block = match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => TextBlock::Heading(text),
            // A bold one-liner in its own paragraph is a heading in disguise.
            "p" if is_marked_heading(&text) => TextBlock::Heading(text),
            _ => TextBlock::Paragraph(text),
        };
        blocks.push(block);
    }

    // Documents without block markup: fall back to the body text.
    if blocks.is_empty() {
        if let Ok(body) = Selector::parse("body") {
            if let Some(el) = document.select(&body).next() {
                let text = collapse(&el.text().collect::<String>());
                if !text.is_empty() {
                    blocks.push(TextBlock::Paragraph(text));
                }
            }
        }
    }
    blocks
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_html() {
        let html = br#"<html><head><title>Test Doc</title></head><body>
            <h1>Chapter One</h1>
            <p>First paragraph of chapter one.</p>
            <h2>Section A</h2>
            <p>Paragraph in   section A.</p>
            <ul><li><p>Nested item.</p></li></ul>
        </body></html>"#;

        let parsed = HtmlParser.parse(html).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Test Doc"));
        assert_eq!(
            parsed.blocks,
            vec![
                TextBlock::Heading("Chapter One".into()),
                TextBlock::Paragraph("First paragraph of chapter one.".into()),
                TextBlock::Heading("Section A".into()),
                TextBlock::Paragraph("Paragraph in section A.".into()),
                TextBlock::Paragraph("Nested item.".into()),
            ]
        );
    }

    #[test]
    fn title_falls_back_to_first_heading() {
        let parsed = HtmlParser.parse(b"<h2>Overview</h2><p>Body text.</p>").unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Overview"));
    }

    #[test]
    fn bare_body_text_is_kept() {
        let parsed = HtmlParser.parse(b"<html><body>Just some text</body></html>").unwrap();
        assert_eq!(parsed.blocks, vec![TextBlock::Paragraph("Just some text".into())]);
    }
}
