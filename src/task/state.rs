//! Task lifecycle states, pipeline stages and their progress bands.

use serde::{Deserialize, Serialize};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractingText,
    ChunkingContent,
    ClassifyingGenre,
    ExtractingConcepts,
    BuildingRelationships,
    Finalizing,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::ExtractingText,
        Self::ChunkingContent,
        Self::ClassifyingGenre,
        Self::ExtractingConcepts,
        Self::BuildingRelationships,
        Self::Finalizing,
    ];

    /// Overall progress band `[start, end)` owned by this stage, in percent.
    pub fn band(self) -> (f64, f64) {
        match self {
            Self::ExtractingText => (0.0, 20.0),
            Self::ChunkingContent => (20.0, 35.0),
            Self::ClassifyingGenre => (35.0, 50.0),
            Self::ExtractingConcepts => (50.0, 70.0),
            Self::BuildingRelationships => (70.0, 90.0),
            Self::Finalizing => (90.0, 100.0),
        }
    }

    /// Overall progress for `local_pct` percent of this stage done.
    pub fn progress_at(self, local_pct: f64) -> f64 {
        let (start, end) = self.band();
        let local = if local_pct.is_nan() {
            0.0
        } else {
            local_pct.clamp(0.0, 100.0)
        };
        start + (end - start) * local / 100.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExtractingText => "extracting_text",
            Self::ChunkingContent => "chunking_content",
            Self::ClassifyingGenre => "classifying_genre",
            Self::ExtractingConcepts => "extracting_concepts",
            Self::BuildingRelationships => "building_relationships",
            Self::Finalizing => "finalizing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
///
/// `Queued → Running(stage) → {Completed | Failed | Cancelled}`. The three
/// terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running(Stage),
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Current stage while running.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Running(stage) => Some(*stage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running(_) => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running(stage) => write!(f, "running({stage})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Error categories recorded on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Every extraction strategy came back empty.
    ExtractionFailed,
    /// A parameter was outside its contract range.
    InvalidConfig,
    TaskNotFound,
    Cancelled,
    /// Every extraction attempt hit its timeout.
    InternalTimeout,
    /// A bug: a panic or an unexpected stage failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractionFailed => "extraction_failed",
            Self::InvalidConfig => "invalid_config",
            Self::TaskNotFound => "task_not_found",
            Self::Cancelled => "cancelled",
            Self::InternalTimeout => "internal_timeout",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal error stored on the task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
