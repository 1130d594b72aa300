//! Stage sequencing for one analysis job.
//!
//! The pipeline runs extraction, chunking, genre classification, concept
//! extraction, relationship building and hub assembly in that order, and
//! reports progress to the [`TaskRegistry`] as it goes. Between stages it
//! passes a [`Checkpoint`]; cancellation is honoured there and nowhere else,
//! so a running stage always finishes first.
//!
//! Every terminal outcome, including failures, is written to the task record.
//! Nothing is returned across the polling boundary.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::{
    Genre, GenreReport, RelationParams, build_hub, build_relationships, chunk_document,
    chunk_features, classify, extract_concepts,
};
use crate::config::{AnalysisConfig, EngineConfig, SubmitConfig};
use crate::extract::error::ExtractError;
use crate::extract::{Extraction, ExtractionCoordinator, ExtractionInput};
use crate::model::{
    Chunk, ChunkingReport, Document, DocumentAnalysis, DocumentId, DocumentSource, IdAllocator,
    RelationshipEdge, now_millis,
};
use crate::task::{ErrorKind, Stage, TaskId, TaskRegistry, TrackerResult};

// ---------------------------------------------------------------------------
// Document references
// ---------------------------------------------------------------------------

/// What to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentRef {
    /// A file read by the worker when the job starts.
    Path(PathBuf),
    /// Bytes already in memory; `name` drives extension-based format hints.
    Bytes { name: String, bytes: Vec<u8> },
}

impl DocumentRef {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn source(&self) -> DocumentSource {
        match self {
            Self::Path(path) => DocumentSource::File(path.clone()),
            Self::Bytes { name, .. } => DocumentSource::Inline { name: name.clone() },
        }
    }

    /// Load the bytes. Files are read here, on the calling thread.
    pub fn load(self) -> std::io::Result<ExtractionInput> {
        match self {
            Self::Path(path) => {
                let bytes = std::fs::read(&path)?;
                Ok(ExtractionInput::new(bytes, path.display().to_string()))
            }
            Self::Bytes { name, bytes } => Ok(ExtractionInput::new(bytes, name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Suspension point between two stages.
///
/// Called before `next` starts. Returning `true` stops the job as cancelled.
pub trait Checkpoint: Send + Sync {
    fn reached(&self, registry: &TaskRegistry, task: TaskId, next: Stage) -> bool;
}

/// Honours the task's cancel flag; optionally yields the worker thread to
/// other pool jobs first.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancellationCheckpoint {
    pub yield_to_pool: bool,
}

impl Checkpoint for CancellationCheckpoint {
    fn reached(&self, registry: &TaskRegistry, task: TaskId, _next: Stage) -> bool {
        if self.yield_to_pool {
            let _ = rayon::yield_now();
        }
        // A vanished record cannot be written to anyway.
        registry.is_cancel_requested(task).unwrap_or(true)
    }
}

/// Requests cancellation of every job when it reaches `stage`.
#[derive(Debug, Clone, Copy)]
pub struct CancelAtStage(pub Stage);

impl Checkpoint for CancelAtStage {
    fn reached(&self, registry: &TaskRegistry, task: TaskId, next: Stage) -> bool {
        if next == self.0 {
            let _ = registry.cancel(task);
        }
        registry.is_cancel_requested(task).unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// Relationship building
// ---------------------------------------------------------------------------

/// Builds the edge set of one document's chunks.
///
/// A failure here does not fail the job: the pipeline keeps the chunks,
/// marks the edges as degraded and records a warning.
pub trait RelationBuilder: Send + Sync {
    fn build(
        &self,
        chunks: &[Chunk],
        genre: Genre,
        params: RelationParams,
    ) -> AnalysisResult<Vec<RelationshipEdge>>;
}

/// Concept-overlap similarity with genre bonuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRelations;

impl RelationBuilder for SimilarityRelations {
    fn build(
        &self,
        chunks: &[Chunk],
        genre: Genre,
        params: RelationParams,
    ) -> AnalysisResult<Vec<RelationshipEdge>> {
        build_relationships(chunks, genre, params)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Work accumulated so far; becomes the partial result on cancellation.
struct Draft {
    document: Document,
    genre: Option<GenreReport>,
    chunks: Vec<Chunk>,
    chunking: ChunkingReport,
    edges: Vec<RelationshipEdge>,
    warnings: Vec<String>,
    edges_degraded: bool,
}

impl Draft {
    fn finish(self, complete: bool, top_k: usize) -> DocumentAnalysis {
        let hub = complete.then(|| {
            let title = match &self.document.title {
                Some(title) => title.clone(),
                None => stem(&self.document.source.name_hint()),
            };
            build_hub(&title, &self.chunks, &self.edges, top_k)
        });
        DocumentAnalysis {
            document: self.document,
            genre: self.genre,
            chunks: self.chunks,
            edges: self.edges,
            hub,
            chunking: Some(self.chunking),
            warnings: self.warnings,
            edges_degraded: self.edges_degraded,
            complete,
        }
    }
}

/// File stem of a path-like name, or the name itself.
fn stem(name: &str) -> String {
    std::path::Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

enum Outcome {
    Completed(DocumentAnalysis),
    Cancelled(Option<DocumentAnalysis>),
    Failed(ErrorKind, String),
}

/// Runs jobs end to end. Shared by every worker.
pub struct Pipeline {
    coordinator: ExtractionCoordinator,
    analysis: AnalysisConfig,
    checkpoint: Arc<dyn Checkpoint>,
    relations: Arc<dyn RelationBuilder>,
    documents: IdAllocator,
}

impl Pipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_parts(
            ExtractionCoordinator::new(&config.extraction),
            config.analysis.clone(),
            Arc::new(CancellationCheckpoint {
                yield_to_pool: config.yield_at_checkpoints,
            }),
        )
    }

    pub fn with_parts(
        coordinator: ExtractionCoordinator,
        analysis: AnalysisConfig,
        checkpoint: Arc<dyn Checkpoint>,
    ) -> Self {
        Self {
            coordinator,
            analysis,
            checkpoint,
            relations: Arc::new(SimilarityRelations),
            documents: IdAllocator::new(),
        }
    }

    /// Replace the checkpoint.
    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn Checkpoint>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Replace the relationship builder.
    pub fn with_relations(mut self, relations: Arc<dyn RelationBuilder>) -> Self {
        self.relations = relations;
        self
    }

    pub fn coordinator(&self) -> &ExtractionCoordinator {
        &self.coordinator
    }

    /// Run one job and record its terminal state on `task`.
    ///
    /// Errors are only returned when the task record itself is gone or was
    /// finished by someone else.
    pub fn run(
        &self,
        registry: &TaskRegistry,
        task: TaskId,
        document: DocumentRef,
        job: &SubmitConfig,
    ) -> TrackerResult<()> {
        match self.execute(registry, task, document, job)? {
            Outcome::Completed(analysis) => {
                tracing::info!(
                    task_id = %task,
                    chunks = analysis.chunks.len(),
                    edges = analysis.edges.len(),
                    quality = analysis.quality_score(),
                    "analysis finished"
                );
                registry.complete(task, analysis)
            }
            Outcome::Cancelled(partial) => registry.mark_cancelled(task, partial),
            Outcome::Failed(kind, message) => registry.fail(task, kind, message),
        }
    }

    fn stop(&self, registry: &TaskRegistry, task: TaskId, next: Stage) -> bool {
        self.checkpoint.reached(registry, task, next)
    }

    fn warn(registry: &TaskRegistry, task: TaskId, warnings: &mut Vec<String>, message: String) -> TrackerResult<()> {
        tracing::warn!(task_id = %task, "{message}");
        registry.add_warning(task, message.clone())?;
        warnings.push(message);
        Ok(())
    }

    fn execute(
        &self,
        registry: &TaskRegistry,
        task: TaskId,
        document: DocumentRef,
        job: &SubmitConfig,
    ) -> TrackerResult<Outcome> {
        // -- extracting_text ------------------------------------------------
        if self.stop(registry, task, Stage::ExtractingText) {
            return Ok(Outcome::Cancelled(None));
        }
        registry.advance(task, Stage::ExtractingText, 0.0)?;
        let source = document.source();
        let input = match document.load() {
            Ok(input) => input,
            Err(e) => {
                return Ok(Outcome::Failed(
                    ErrorKind::ExtractionFailed,
                    format!("cannot read {source}: {e}"),
                ));
            }
        };
        let extraction = self.coordinator.extract_with(&input, job.strategy_hint, |done, total, _| {
            let pct = done as f64 * 100.0 / total.max(1) as f64;
            if let Err(e) = registry.advance(task, Stage::ExtractingText, pct) {
                tracing::debug!(task_id = %task, error = %e, "progress update rejected");
            }
        });
        let extraction = match extraction {
            Ok(extraction) => extraction,
            Err(e) => {
                let kind = match e {
                    ExtractError::AllStrategiesTimedOut { .. } => ErrorKind::InternalTimeout,
                    _ => ErrorKind::ExtractionFailed,
                };
                return Ok(Outcome::Failed(kind, e.to_string()));
            }
        };
        registry.advance(task, Stage::ExtractingText, 100.0)?;
        let Some(document_id) = self.documents.next_document() else {
            return Ok(Outcome::Failed(ErrorKind::Internal, "document ids exhausted".into()));
        };
        let document = build_document(document_id, source, extraction);

        // -- chunking_content -----------------------------------------------
        if self.stop(registry, task, Stage::ChunkingContent) {
            return Ok(Outcome::Cancelled(None));
        }
        registry.advance(task, Stage::ChunkingContent, 0.0)?;
        let (chunks, chunking) = match chunk_document(
            document.id,
            &document.text,
            job.max_chunks,
            self.analysis.title_words,
        ) {
            Ok(chunked) => chunked,
            Err(AnalysisError::EmptyText) => {
                return Ok(Outcome::Failed(
                    ErrorKind::ExtractionFailed,
                    "extracted text contains no sentences".into(),
                ));
            }
            Err(e @ AnalysisError::InvalidChunkCount { .. }) => {
                return Ok(Outcome::Failed(ErrorKind::InvalidConfig, e.to_string()));
            }
            Err(e) => return Ok(Outcome::Failed(ErrorKind::Internal, e.to_string())),
        };
        let mut draft = Draft {
            document,
            genre: None,
            chunks,
            chunking,
            edges: Vec::new(),
            warnings: Vec::new(),
            edges_degraded: false,
        };
        if chunking.reduced {
            Self::warn(
                registry,
                task,
                &mut draft.warnings,
                format!(
                    "document has only {} sentence-aligned chunks; {} requested",
                    chunking.produced, chunking.requested
                ),
            )?;
        }
        registry.advance(task, Stage::ChunkingContent, 100.0)?;
        tracing::info!(task_id = %task, chunks = draft.chunks.len(), "document chunked");

        // -- classifying_genre ----------------------------------------------
        if self.stop(registry, task, Stage::ClassifyingGenre) {
            return Ok(Outcome::Cancelled(Some(draft.finish(false, job.top_k_edges))));
        }
        registry.advance(task, Stage::ClassifyingGenre, 0.0)?;
        let report = classify(&draft.document.text);
        let genre = report.genre;
        draft.document.genre = Some(genre);
        draft.chunks.par_iter_mut().for_each(|chunk| {
            chunk.genre = Some(genre);
            chunk.features = chunk_features(&chunk.text);
        });
        tracing::info!(task_id = %task, genre = %genre, confidence = report.confidence, "genre classified");
        draft.genre = Some(report);
        registry.advance(task, Stage::ClassifyingGenre, 100.0)?;

        // -- extracting_concepts --------------------------------------------
        if self.stop(registry, task, Stage::ExtractingConcepts) {
            return Ok(Outcome::Cancelled(Some(draft.finish(false, job.top_k_edges))));
        }
        registry.advance(task, Stage::ExtractingConcepts, 0.0)?;
        extract_concepts(&mut draft.chunks, genre, self.analysis.concepts_per_chunk);
        registry.advance(task, Stage::ExtractingConcepts, 100.0)?;

        // -- building_relationships -----------------------------------------
        if self.stop(registry, task, Stage::BuildingRelationships) {
            return Ok(Outcome::Cancelled(Some(draft.finish(false, job.top_k_edges))));
        }
        registry.advance(task, Stage::BuildingRelationships, 0.0)?;
        let params = RelationParams {
            threshold: job.relevance_threshold,
            cross_mention_bonus: self.analysis.cross_mention_bonus,
        };
        let built = catch_unwind(AssertUnwindSafe(|| {
            self.relations.build(&draft.chunks, genre, params)
        }))
        .unwrap_or_else(|panic| {
            Err(AnalysisError::RelationsPanicked {
                message: panic_message(panic.as_ref()),
            })
        });
        match built {
            Ok(edges) => draft.edges = edges,
            Err(e) => {
                draft.edges_degraded = true;
                Self::warn(
                    registry,
                    task,
                    &mut draft.warnings,
                    format!("relationship building failed, continuing without edges: {e}"),
                )?;
            }
        }
        registry.advance(task, Stage::BuildingRelationships, 100.0)?;

        // -- finalizing -----------------------------------------------------
        if self.stop(registry, task, Stage::Finalizing) {
            return Ok(Outcome::Cancelled(Some(draft.finish(false, job.top_k_edges))));
        }
        registry.advance(task, Stage::Finalizing, 0.0)?;
        Ok(Outcome::Completed(draft.finish(true, job.top_k_edges)))
    }
}

fn build_document(id: DocumentId, source: DocumentSource, extraction: Extraction) -> Document {
    Document {
        id,
        source,
        title: extraction.title,
        format: extraction.format,
        text: Arc::from(extraction.text),
        genre: None,
        quality_score: extraction.quality.score,
        strategy: extraction.strategy,
        page_count: extraction.page_count,
        attempts: extraction.attempts,
        created_at: now_millis(),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::task::TaskState;

    const TEXT: &str = "# Installing\n\nInstall the agent on the server. Verify the install log.\n\n\
        # Configuring\n\nConfigure the agent after you install it. Verify the configuration.\n\n\
        # Verifying\n\nVerify the agent and configure alerts. Install updates monthly.";

    fn pipeline(checkpoint: Arc<dyn Checkpoint>) -> Pipeline {
        Pipeline::with_parts(
            ExtractionCoordinator::new(&ExtractionConfig::default()),
            AnalysisConfig::default(),
            checkpoint,
        )
    }

    fn run(checkpoint: Arc<dyn Checkpoint>, text: &str, job: SubmitConfig) -> (TaskRegistry, TaskId) {
        run_pipeline(pipeline(checkpoint), text, job)
    }

    fn run_pipeline(pipeline: Pipeline, text: &str, job: SubmitConfig) -> (TaskRegistry, TaskId) {
        let registry = TaskRegistry::new();
        let task = registry.create("test").unwrap();
        pipeline
            .run(&registry, task, DocumentRef::bytes("guide.md", text), &job)
            .unwrap();
        (registry, task)
    }

    struct FailingRelations;

    impl RelationBuilder for FailingRelations {
        fn build(
            &self,
            chunks: &[Chunk],
            _genre: Genre,
            _params: RelationParams,
        ) -> AnalysisResult<Vec<RelationshipEdge>> {
            Err(AnalysisError::DuplicateChunk {
                chunk: chunks[0].id.to_string(),
            })
        }
    }

    struct PanickingRelations;

    impl RelationBuilder for PanickingRelations {
        fn build(
            &self,
            _chunks: &[Chunk],
            _genre: Genre,
            _params: RelationParams,
        ) -> AnalysisResult<Vec<RelationshipEdge>> {
            panic!("similarity table corrupted");
        }
    }

    fn assert_degraded(registry: &TaskRegistry, task: TaskId, cause: &str) {
        let status = registry.get_status(task).unwrap();
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.warnings.len(), 1);
        assert!(status.warnings[0].contains(cause), "{:?}", status.warnings);
        let result = registry.get_result(task).unwrap();
        assert!(result.complete);
        assert_eq!(result.chunks.len(), 3);
        assert!(result.edges.is_empty());
        assert!(result.edges_degraded);
        assert_eq!(result.warnings, status.warnings);
        assert!(result.hub.is_some());
    }

    #[test]
    fn relationship_failure_completes_without_edges() {
        let pipeline = pipeline(Arc::new(CancellationCheckpoint::default()))
            .with_relations(Arc::new(FailingRelations));
        let (registry, task) =
            run_pipeline(pipeline, TEXT, SubmitConfig::default().with_max_chunks(3));
        assert_degraded(&registry, task, "duplicate chunk id");
    }

    #[test]
    fn relationship_panic_completes_without_edges() {
        let pipeline = pipeline(Arc::new(CancellationCheckpoint::default()))
            .with_relations(Arc::new(PanickingRelations));
        let (registry, task) =
            run_pipeline(pipeline, TEXT, SubmitConfig::default().with_max_chunks(3));
        assert_degraded(&registry, task, "similarity table corrupted");
    }

    #[test]
    fn completes_with_chunks_edges_and_hub() {
        let (registry, task) = run(
            Arc::new(CancellationCheckpoint::default()),
            TEXT,
            SubmitConfig::default().with_max_chunks(3),
        );
        let status = registry.get_status(task).unwrap();
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.progress, 100.0);
        let result = registry.get_result(task).unwrap();
        assert!(result.complete);
        assert_eq!(result.chunks.len(), 3);
        assert_eq!(result.chunks[1].title, "Configuring");
        assert!(!result.edges.is_empty());
        let hub = result.hub.as_ref().unwrap();
        assert_eq!(hub.entries.len(), 3);
        assert!(hub.file_names[0].starts_with("guide_01_"));
    }

    #[test]
    fn empty_text_fails_as_extraction_failure() {
        let (registry, task) = run(
            Arc::new(CancellationCheckpoint::default()),
            "  \n\t ",
            SubmitConfig::default(),
        );
        let status = registry.get_status(task).unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.error.unwrap().kind, ErrorKind::ExtractionFailed);
    }

    #[test]
    fn cancel_after_chunking_keeps_chunks_without_edges() {
        let (registry, task) = run(
            Arc::new(CancelAtStage(Stage::ClassifyingGenre)),
            TEXT,
            SubmitConfig::default().with_max_chunks(3),
        );
        let status = registry.get_status(task).unwrap();
        assert_eq!(status.state, TaskState::Cancelled);
        assert_eq!(status.error.unwrap().kind, ErrorKind::Cancelled);
        let partial = registry.get_result(task).unwrap();
        assert!(!partial.complete);
        assert_eq!(partial.chunks.len(), 3);
        assert!(partial.edges.is_empty());
        assert!(partial.hub.is_none());
    }

    #[test]
    fn cancel_before_start_has_no_result() {
        let (registry, task) = run(
            Arc::new(CancelAtStage(Stage::ExtractingText)),
            TEXT,
            SubmitConfig::default(),
        );
        assert_eq!(registry.get_status(task).unwrap().state, TaskState::Cancelled);
        assert!(registry.get_result(task).is_err());
    }

    #[test]
    fn reduced_chunk_count_is_a_warning() {
        let (registry, task) = run(
            Arc::new(CancellationCheckpoint::default()),
            "Only one sentence here about the agent install.",
            SubmitConfig::default().with_max_chunks(5),
        );
        let status = registry.get_status(task).unwrap();
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.warnings.len(), 1);
        let result = registry.get_result(task).unwrap();
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.warnings, status.warnings);
        assert!(result.chunking.unwrap().reduced);
    }

    #[test]
    fn missing_file_fails_the_task() {
        let registry = TaskRegistry::new();
        let task = registry.create("missing").unwrap();
        pipeline(Arc::new(CancellationCheckpoint::default()))
            .run(
                &registry,
                task,
                DocumentRef::path("/nonexistent/crossref/input.txt"),
                &SubmitConfig::default(),
            )
            .unwrap();
        let error = registry.get_status(task).unwrap().error.unwrap();
        assert_eq!(error.kind, ErrorKind::ExtractionFailed);
        assert!(error.message.contains("cannot read"));
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
