//! Direct text extraction: the fastest strategy, no layout reconstruction.

use scraper::{Html, Selector};

use crate::extract::error::{ExtractError, ExtractResult};
use crate::extract::format::ContentFormat;
use crate::extract::parser::pdf::{extract_pdf_text, page_count};
use crate::extract::{Deadline, ExtractionInput, Extractor, RawExtraction, StrategyKind};

/// Pulls the text layer out as-is: PDF text runs, HTML body text, or the
/// bytes decoded as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTextExtractor;

impl Extractor for DirectTextExtractor {
    fn strategy(&self) -> StrategyKind {
        StrategyKind::DirectText
    }

    fn extract(&self, input: &ExtractionInput, deadline: &Deadline) -> ExtractResult<RawExtraction> {
        deadline.check(self.strategy())?;
        match input.format {
            ContentFormat::Pdf => {
                let text = extract_pdf_text(&input.bytes)?;
                Ok(RawExtraction {
                    page_count: Some(page_count(&text)),
                    text,
                    confidence: 0.8,
                    title: None,
                })
            }
            ContentFormat::Html => {
                let source = String::from_utf8_lossy(&input.bytes);
                let document = Html::parse_document(&source);
                let body = Selector::parse("body").expect("static selector must parse");
                let text = document
                    .select(&body)
                    .next()
                    .map(|el| el.text().collect::<Vec<_>>().join("\n"))
                    .unwrap_or_default();
                Ok(RawExtraction {
                    text,
                    confidence: 0.6,
                    page_count: None,
                    title: None,
                })
            }
            ContentFormat::PlainText => Ok(RawExtraction {
                text: String::from_utf8_lossy(&input.bytes).into_owned(),
                confidence: 1.0,
                page_count: None,
                title: None,
            }),
            ContentFormat::Epub | ContentFormat::Image => Err(ExtractError::NotApplicable {
                strategy: self.strategy().to_string(),
                format: input.format.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let input = ExtractionInput::new(b"hello world".to_vec(), "a.txt");
        let raw = DirectTextExtractor.extract(&input, &Deadline::unbounded()).unwrap();
        assert_eq!(raw.text, "hello world");
        assert_eq!(raw.confidence, 1.0);
    }

    #[test]
    fn html_body_text() {
        let input = ExtractionInput::new(
            b"<html><head><title>T</title></head><body><p>One</p><p>Two</p></body></html>".to_vec(),
            "a.html",
        );
        let raw = DirectTextExtractor.extract(&input, &Deadline::unbounded()).unwrap();
        assert_eq!(raw.text, "One\nTwo");
    }

    #[test]
    fn expired_deadline_stops_before_work() {
        let input = ExtractionInput::new(b"hello world".to_vec(), "a.txt");
        let deadline = Deadline::unbounded();
        deadline.abandon();
        assert!(matches!(
            DirectTextExtractor.extract(&input, &deadline),
            Err(ExtractError::DeadlineExceeded { .. })
        ));
    }

    #[test]
    fn images_are_not_applicable() {
        let input = ExtractionInput::new(b"\x89PNG\r\n\x1a\n".to_vec(), "scan.png");
        assert!(matches!(
            DirectTextExtractor.extract(&input, &Deadline::unbounded()),
            Err(ExtractError::NotApplicable { .. })
        ));
    }
}
