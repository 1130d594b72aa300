//! Rich diagnostic error types for the cross-reference engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. [`CrossrefError`] wraps them all so the
//! full diagnostic survives to the CLI.

use miette::Diagnostic;
use thiserror::Error;

use crate::analysis::error::AnalysisError;
use crate::config::ConfigError;
use crate::extract::error::ExtractError;
use crate::task::error::TrackerError;

/// Top-level error type.
#[derive(Debug, Error, Diagnostic)]
pub enum CrossrefError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

impl CrossrefError {
    /// `true` for an out-of-range parameter rejected before any work started.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::Config(ConfigError::Invalid { .. }))
    }

    /// `true` for an unknown task id.
    pub fn is_task_not_found(&self) -> bool {
        matches!(self, Self::Tracker(TrackerError::TaskNotFound { .. }))
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("failed to start the worker pool: {message}")]
    #[diagnostic(
        code(crossref::engine::worker_pool),
        help("The operating system refused to spawn worker threads. Try a smaller `workers` value.")
    )]
    WorkerPool { message: String },

    #[error("engine is shut down")]
    #[diagnostic(
        code(crossref::engine::shut_down),
        help("No new jobs are accepted after `Engine::shutdown`. Create a new engine.")
    )]
    ShutDown,

    #[error("timed out after {waited_ms} ms waiting for {task}")]
    #[diagnostic(
        code(crossref::engine::wait_timeout),
        help("The job is still running. Poll `get_status` again or raise the wait limit.")
    )]
    WaitTimeout { task: String, waited_ms: u64 },
}

/// Convenience alias for engine-level results.
pub type CrossrefResult<T> = std::result::Result<T, CrossrefError>;
