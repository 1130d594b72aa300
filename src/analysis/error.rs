//! Rich diagnostic error types for the analysis stages.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from chunking, concept extraction and relationship building.
#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error("document text contains no sentences")]
    #[diagnostic(
        code(crossref::analysis::empty_text),
        help("Chunking needs at least one sentence. Check the extraction quality report.")
    )]
    EmptyText,

    #[error("cannot split into {requested} chunks")]
    #[diagnostic(
        code(crossref::analysis::invalid_chunk_count),
        help("Request between 1 and 50 chunks.")
    )]
    InvalidChunkCount { requested: usize },

    #[error("duplicate chunk id {chunk}")]
    #[diagnostic(
        code(crossref::analysis::duplicate_chunk),
        help("Chunk ids must be unique within the set passed to the relationship engine.")
    )]
    DuplicateChunk { chunk: String },

    #[error("similarity between {chunk_a} and {chunk_b} is not a finite number")]
    #[diagnostic(
        code(crossref::analysis::non_finite_score),
        help("A concept vector carried a NaN or infinite weight. This is a bug in concept weighting.")
    )]
    NonFiniteScore { chunk_a: String, chunk_b: String },

    #[error("relationship engine panicked: {message}")]
    #[diagnostic(
        code(crossref::analysis::relations_panicked),
        help("This is a bug. The job completed with chunks but without edges.")
    )]
    RelationsPanicked { message: String },
}

/// Convenience alias for analysis results.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
