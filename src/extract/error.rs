//! Rich diagnostic error types for text extraction.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from extraction strategies and the coordinator.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("extraction failed for \"{origin}\": {message}")]
    #[diagnostic(
        code(crossref::extract::failed),
        help(
            "Every extraction strategy produced empty or near-empty text. \
             The document may be empty, encrypted, or an image without an \
             available OCR engine. Run `crossref extract <file>` to see each attempt."
        )
    )]
    ExtractionFailed { origin: String, message: String },

    #[error("every extraction strategy for \"{origin}\" timed out")]
    #[diagnostic(
        code(crossref::extract::timeout),
        help(
            "Raise `extraction.strategy_timeout_ms` in the engine config, \
             or pass a strategy hint that suits the document."
        )
    )]
    AllStrategiesTimedOut { origin: String },

    #[error("{strategy} extraction does not handle {format} content")]
    #[diagnostic(
        code(crossref::extract::not_applicable),
        help("The coordinator records this attempt and moves on to the next strategy.")
    )]
    NotApplicable { strategy: String, format: String },

    #[error("parse error in {format} document: {message}")]
    #[diagnostic(
        code(crossref::extract::parse_error),
        help("Verify the file is valid {format} and not corrupted.")
    )]
    ParseError { format: String, message: String },

    #[error("external tool \"{tool}\" is unavailable: {message}")]
    #[diagnostic(
        code(crossref::extract::tool_unavailable),
        help(
            "Install the tool or point the OCR config at its location \
             (`extraction.ocr.command` / `extraction.ocr.pdf_renderer`)."
        )
    )]
    ToolUnavailable { tool: String, message: String },

    #[error("OCR failed: {message}")]
    #[diagnostic(
        code(crossref::extract::ocr),
        help("The OCR engine ran but reported an error. Check the image quality and OCR languages.")
    )]
    Ocr { message: String },

    #[error("{strategy} extraction ran past its deadline")]
    #[diagnostic(
        code(crossref::extract::deadline),
        help("The attempt was abandoned. Raise `extraction.strategy_timeout_ms` for large documents.")
    )]
    DeadlineExceeded { strategy: String },

    #[error("{strategy} extraction worker terminated without a result")]
    #[diagnostic(
        code(crossref::extract::worker_lost),
        help("The strategy panicked. This is a bug in the strategy implementation.")
    )]
    WorkerLost { strategy: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(crossref::extract::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for ExtractError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

/// Convenience alias for extraction results.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
