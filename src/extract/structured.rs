//! Structured extraction: format-aware parsing that keeps headings and
//! paragraph boundaries.

use crate::extract::error::{ExtractError, ExtractResult};
use crate::extract::parser::parser_for;
use crate::extract::{Deadline, ExtractionInput, Extractor, RawExtraction, StrategyKind};

/// Layout-aware extraction backed by the per-format [`ContentParser`]s.
///
/// [`ContentParser`]: crate::extract::parser::ContentParser
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredExtractor;

impl Extractor for StructuredExtractor {
    fn strategy(&self) -> StrategyKind {
        StrategyKind::Structured
    }

    fn extract(&self, input: &ExtractionInput, deadline: &Deadline) -> ExtractResult<RawExtraction> {
        let parser = parser_for(input.format).ok_or_else(|| ExtractError::NotApplicable {
            strategy: self.strategy().to_string(),
            format: input.format.to_string(),
        })?;

        deadline.check(self.strategy())?;
        let parsed = parser.parse(&input.bytes)?;
        let paragraphs = parsed.blocks.len();
        tracing::debug!(
            format = %input.format,
            blocks = paragraphs,
            words = parsed.word_count(),
            "structured parse complete"
        );

        Ok(RawExtraction {
            text: parsed.render(),
            confidence: if paragraphs > 0 { 0.9 } else { 0.0 },
            page_count: parsed.page_count,
            title: parsed.title.clone(),
        })
    }
}
