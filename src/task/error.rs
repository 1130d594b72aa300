//! Rich diagnostic error types for the task tracker.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from task registry operations.
#[derive(Debug, Error, Diagnostic)]
pub enum TrackerError {
    #[error("task not found: {id}")]
    #[diagnostic(
        code(crossref::task::not_found),
        help("The task id is unknown or was removed. List tasks with `Engine::list_tasks`.")
    )]
    TaskNotFound { id: String },

    #[error("invalid transition for {id}: {from} -> {to}")]
    #[diagnostic(
        code(crossref::task::invalid_transition),
        help(
            "Terminal tasks (completed, failed, cancelled) never change again, \
             and stages only move forward."
        )
    )]
    InvalidTransition { id: String, from: String, to: String },

    #[error("no result available for {id} (state: {state})")]
    #[diagnostic(
        code(crossref::task::result_unavailable),
        help(
            "Results exist once a task has completed, or after a cancellation \
             that happened past the chunking stage. Poll `get_status` first."
        )
    )]
    ResultUnavailable { id: String, state: String },

    #[error("task {id} is still active")]
    #[diagnostic(
        code(crossref::task::still_active),
        help("Cancel the task and wait for it to reach a terminal state before removing it.")
    )]
    StillActive { id: String },

    #[error("task id space exhausted")]
    #[diagnostic(
        code(crossref::task::ids_exhausted),
        help("The 64-bit task id counter overflowed. Create a new registry.")
    )]
    IdsExhausted,
}

/// Convenience alias for task tracker results.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;
