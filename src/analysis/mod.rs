//! Content analysis of extracted text.
//!
//! Normalized text is split into sentence-aligned chunks, the document is
//! classified against the genre profiles, each chunk gets a genre-boosted
//! concept vector, and chunk pairs whose concepts overlap enough are linked
//! by reasoned edges. The hub module turns those edges into mandatory-read
//! lists for a renderer.

pub mod chunker;
pub mod concepts;
pub mod error;
pub mod genre;
pub mod hub;
pub mod relations;
pub mod text;

pub use chunker::chunk_document;
pub use concepts::extract_concepts;
pub use error::{AnalysisError, AnalysisResult};
pub use genre::{Genre, GenreReport, RelationshipKind, chunk_features, classify};
pub use hub::build_hub;
pub use relations::{RelationParams, build_relationships, relate_documents};
