//! Task tracker: lifecycle and progress of asynchronous analysis jobs.
//!
//! The [`TaskRegistry`] owns one [`TaskRecord`] per job. Pipeline workers
//! write to it; callers poll it. Every write happens under the record's
//! shard lock, and reads clone a [`TaskStatus`] snapshot under the same lock.
//! A reader therefore never sees a stage from one update paired with the
//! progress of another.

pub mod error;
pub mod state;

use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::{DocumentAnalysis, IdAllocator, now_millis};

pub use self::error::{TrackerError, TrackerResult};
pub use self::state::{ErrorKind, Stage, TaskError, TaskState};

/// Identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(TaskId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = String;

    /// Accepts `task:7` or `7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("task:").unwrap_or(s);
        digits
            .parse::<u64>()
            .ok()
            .and_then(TaskId::new)
            .ok_or_else(|| format!("invalid task id \"{s}\""))
    }
}

/// Mutable per-task state. Only the registry touches it.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Human-readable document label.
    pub source: String,
    pub state: TaskState,
    /// Most recent stage entered. Unlike `state`, survives the end of the task.
    pub last_stage: Option<Stage>,
    /// Overall progress in percent.
    pub progress: f64,
    pub error: Option<TaskError>,
    pub warnings: Vec<String>,
    pub cancel_requested: bool,
    pub created_at: u64,
    pub updated_at: u64,
    pub result: Option<Arc<DocumentAnalysis>>,
}

impl TaskRecord {
    fn snapshot(&self) -> TaskStatus {
        TaskStatus {
            id: self.id,
            source: self.source.clone(),
            state: self.state,
            stage: self.state.stage(),
            last_stage: self.last_stage,
            progress: self.progress,
            error: self.error.clone(),
            warnings: self.warnings.clone(),
            cancel_requested: self.cancel_requested,
            has_result: self.result.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }
}

/// Consistent, point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub source: String,
    pub state: TaskState,
    pub stage: Option<Stage>,
    /// Where the task was when it last moved; for a failed or cancelled task,
    /// the stage it stopped in.
    pub last_stage: Option<Stage>,
    /// Overall progress in percent, `0..=100`.
    pub progress: f64,
    pub error: Option<TaskError>,
    pub warnings: Vec<String>,
    pub cancel_requested: bool,
    pub has_result: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owner of every task record.
pub struct TaskRegistry {
    tasks: DashMap<TaskId, TaskRecord>,
    ids: IdAllocator,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            ids: IdAllocator::new(),
        }
    }

    /// Register a new queued task.
    pub fn create(&self, source: impl Into<String>) -> TrackerResult<TaskId> {
        let id = self
            .ids
            .next()
            .map(TaskId)
            .ok_or(TrackerError::IdsExhausted)?;
        let now = now_millis();
        let source = source.into();
        tracing::debug!(task_id = %id, source = %source, "task created");
        self.tasks.insert(
            id,
            TaskRecord {
                id,
                source,
                state: TaskState::Queued,
                last_stage: None,
                progress: 0.0,
                error: None,
                warnings: Vec::new(),
                cancel_requested: false,
                created_at: now,
                updated_at: now,
                result: None,
            },
        );
        Ok(id)
    }

    /// Apply `f` to the record under its write lock.
    fn update<T>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut TaskRecord) -> TrackerResult<T>,
    ) -> TrackerResult<T> {
        let mut entry = self.tasks.get_mut(&id).ok_or_else(|| not_found(id))?;
        let out = f(entry.value_mut())?;
        entry.value_mut().touch();
        Ok(out)
    }

    /// Move to `stage` with `local_pct` of it done. Returns overall progress.
    ///
    /// Progress never decreases. Moving back to an earlier stage, or touching
    /// a terminal task, is an invalid transition.
    pub fn advance(&self, id: TaskId, stage: Stage, local_pct: f64) -> TrackerResult<f64> {
        self.update(id, |rec| {
            if rec.state.is_terminal() {
                return Err(transition(rec, &stage.to_string()));
            }
            if let TaskState::Running(current) = rec.state {
                if stage < current {
                    return Err(transition(rec, &stage.to_string()));
                }
            }
            if rec.state.stage() != Some(stage) {
                tracing::info!(task_id = %id, stage = %stage, "stage started");
            }
            rec.state = TaskState::Running(stage);
            rec.last_stage = Some(stage);
            rec.progress = rec.progress.max(stage.progress_at(local_pct));
            Ok(rec.progress)
        })
    }

    /// Record the final result and mark the task completed.
    pub fn complete(&self, id: TaskId, result: DocumentAnalysis) -> TrackerResult<()> {
        self.update(id, |rec| {
            if rec.state.is_terminal() {
                return Err(transition(rec, "completed"));
            }
            rec.state = TaskState::Completed;
            rec.progress = 100.0;
            rec.result = Some(Arc::new(result));
            tracing::info!(task_id = %id, "task completed");
            Ok(())
        })
    }

    /// Record a terminal error.
    pub fn fail(&self, id: TaskId, kind: ErrorKind, message: impl Into<String>) -> TrackerResult<()> {
        let message = message.into();
        self.update(id, |rec| {
            if rec.state.is_terminal() {
                return Err(transition(rec, "failed"));
            }
            tracing::warn!(task_id = %id, kind = %kind, error = %message, "task failed");
            rec.state = TaskState::Failed;
            rec.error = Some(TaskError::new(kind, message));
            Ok(())
        })
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `true` when the request was recorded, `false` when the task had
    /// already finished. The transition to `Cancelled` happens at the
    /// pipeline's next checkpoint.
    pub fn cancel(&self, id: TaskId) -> TrackerResult<bool> {
        self.update(id, |rec| {
            if rec.state.is_terminal() {
                return Ok(false);
            }
            if !rec.cancel_requested {
                tracing::info!(task_id = %id, state = %rec.state, "cancellation requested");
            }
            rec.cancel_requested = true;
            Ok(true)
        })
    }

    pub fn is_cancel_requested(&self, id: TaskId) -> TrackerResult<bool> {
        self.tasks
            .get(&id)
            .map(|r| r.cancel_requested)
            .ok_or_else(|| not_found(id))
    }

    /// Finish a cancelled task, keeping whatever partial result exists.
    pub fn mark_cancelled(
        &self,
        id: TaskId,
        partial: Option<DocumentAnalysis>,
    ) -> TrackerResult<()> {
        self.update(id, |rec| {
            if rec.state.is_terminal() {
                return Err(transition(rec, "cancelled"));
            }
            rec.state = TaskState::Cancelled;
            rec.error = Some(TaskError::new(
                ErrorKind::Cancelled,
                match rec.last_stage {
                    Some(stage) => format!("cancelled after {stage}"),
                    None => "cancelled before start".into(),
                },
            ));
            rec.result = partial.map(Arc::new);
            tracing::info!(task_id = %id, partial = rec.result.is_some(), "task cancelled");
            Ok(())
        })
    }

    /// Attach a non-fatal warning.
    pub fn add_warning(&self, id: TaskId, warning: impl Into<String>) -> TrackerResult<()> {
        let warning = warning.into();
        self.update(id, |rec| {
            rec.warnings.push(warning);
            Ok(())
        })
    }

    /// Snapshot of one task.
    pub fn get_status(&self, id: TaskId) -> TrackerResult<TaskStatus> {
        self.tasks
            .get(&id)
            .map(|r| r.snapshot())
            .ok_or_else(|| not_found(id))
    }

    /// Result of a completed task, or the partial result of a cancelled one.
    pub fn get_result(&self, id: TaskId) -> TrackerResult<Arc<DocumentAnalysis>> {
        let rec = self.tasks.get(&id).ok_or_else(|| not_found(id))?;
        match (&rec.state, &rec.result) {
            (TaskState::Completed | TaskState::Cancelled, Some(result)) => Ok(Arc::clone(result)),
            (state, _) => Err(TrackerError::ResultUnavailable {
                id: id.to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Every task, newest first.
    pub fn list(&self) -> Vec<TaskStatus> {
        let mut all: Vec<TaskStatus> = self.tasks.iter().map(|r| r.snapshot()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }

    /// Ids of tasks not yet in a terminal state.
    pub fn active_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    /// Drop a finished task and return its final status.
    pub fn remove(&self, id: TaskId) -> TrackerResult<TaskStatus> {
        let removed = self
            .tasks
            .remove_if(&id, |_, rec| rec.state.is_terminal())
            .map(|(_, rec)| rec.snapshot());
        match removed {
            Some(status) => Ok(status),
            None if self.tasks.contains_key(&id) => Err(TrackerError::StillActive {
                id: id.to_string(),
            }),
            None => Err(not_found(id)),
        }
    }

    /// Drop every finished task. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, rec| !rec.state.is_terminal());
        before - self.tasks.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: TaskId) -> TrackerError {
    TrackerError::TaskNotFound { id: id.to_string() }
}

fn transition(rec: &TaskRecord, to: &str) -> TrackerError {
    TrackerError::InvalidTransition {
        id: rec.id.to_string(),
        from: rec.state.to_string(),
        to: to.to_string(),
    }
}
