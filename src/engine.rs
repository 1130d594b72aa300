//! Engine facade: top-level API for submitting and tracking analysis jobs.
//!
//! The `Engine` owns the worker pool, the task registry and the pipeline.
//! `submit` returns immediately with a task id; the job runs on the pool and
//! callers poll `get_status` / `get_result`, which never wait on a worker.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, SubmitConfig};
use crate::error::{CrossrefResult, EngineError};
use crate::model::DocumentAnalysis;
use crate::pipeline::{Checkpoint, DocumentRef, Pipeline, panic_message};
use crate::task::{ErrorKind, TaskId, TaskRegistry, TaskStatus};

/// Interval between polls in [`Engine::wait`].
const WAIT_POLL: Duration = Duration::from_millis(10);

/// The document analysis engine.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<TaskRegistry>,
    pipeline: Arc<Pipeline>,
    pool: rayon::ThreadPool,
    accepting: AtomicBool,
}

impl Engine {
    /// Create a new engine with the given configuration.
    pub fn new(config: EngineConfig) -> CrossrefResult<Self> {
        let pipeline = Pipeline::new(&config);
        Self::with_pipeline(config, pipeline)
    }

    /// Create an engine whose jobs stop at the given checkpoint.
    pub fn with_checkpoint(config: EngineConfig, checkpoint: Arc<dyn Checkpoint>) -> CrossrefResult<Self> {
        let pipeline = Pipeline::new(&config).with_checkpoint(checkpoint);
        Self::with_pipeline(config, pipeline)
    }

    /// Create an engine around a preassembled pipeline.
    pub fn with_pipeline(config: EngineConfig, pipeline: Pipeline) -> CrossrefResult<Self> {
        config.validate()?;
        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("crossref-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool {
                message: e.to_string(),
            })?;
        tracing::info!(
            workers,
            acceptance = config.extraction.acceptance_threshold,
            timeout_ms = config.extraction.strategy_timeout_ms,
            "initializing crossref engine"
        );
        Ok(Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            pipeline: Arc::new(pipeline),
            pool,
            accepting: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The task registry shared with the workers.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Queue a document for analysis.
    ///
    /// The job configuration is validated first; an invalid one creates no
    /// task.
    pub fn submit(&self, document: DocumentRef, job: SubmitConfig) -> CrossrefResult<TaskId> {
        job.validate()?;
        if !self.accepting.load(Ordering::Acquire) {
            return Err(EngineError::ShutDown.into());
        }
        let task = self.registry.create(document.source().to_string())?;
        tracing::info!(
            task_id = %task,
            source = %document.source(),
            max_chunks = job.max_chunks,
            threshold = job.relevance_threshold,
            "job submitted"
        );

        let registry = Arc::clone(&self.registry);
        let pipeline = Arc::clone(&self.pipeline);
        self.pool.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                pipeline.run(&registry, task, document, &job)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(task_id = %task, error = %e, "job ended without a recorded outcome");
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(task_id = %task, error = %message, "job panicked");
                    let _ = registry.fail(task, ErrorKind::Internal, format!("worker panicked: {message}"));
                }
            }
        });
        Ok(task)
    }

    /// Snapshot of a task's state, stage and progress.
    pub fn get_status(&self, task: TaskId) -> CrossrefResult<TaskStatus> {
        Ok(self.registry.get_status(task)?)
    }

    /// Result of a completed task (or the partial result of a cancelled one).
    pub fn get_result(&self, task: TaskId) -> CrossrefResult<Arc<DocumentAnalysis>> {
        Ok(self.registry.get_result(task)?)
    }

    /// Every task, newest first.
    pub fn list_tasks(&self) -> Vec<TaskStatus> {
        self.registry.list()
    }

    /// Request cooperative cancellation. Returns `false` if the task had
    /// already finished.
    pub fn cancel(&self, task: TaskId) -> CrossrefResult<bool> {
        Ok(self.registry.cancel(task)?)
    }

    /// Drop a finished task.
    pub fn remove(&self, task: TaskId) -> CrossrefResult<TaskStatus> {
        Ok(self.registry.remove(task)?)
    }

    /// Poll until the task reaches a terminal state or `limit` elapses.
    pub fn wait(&self, task: TaskId, limit: Duration) -> CrossrefResult<TaskStatus> {
        let started = Instant::now();
        loop {
            let status = self.registry.get_status(task)?;
            if status.state.is_terminal() {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                return Err(EngineError::WaitTimeout {
                    task: task.to_string(),
                    waited_ms: limit.as_millis() as u64,
                }
                .into());
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    /// Stop accepting jobs and request cancellation of every active task.
    ///
    /// Returns the ids that were asked to cancel. Workers finish their
    /// current stage; dropping the engine afterwards releases the pool.
    pub fn shutdown(&self) -> Vec<TaskId> {
        self.accepting.store(false, Ordering::Release);
        let active = self.registry.active_ids();
        for &task in &active {
            let _ = self.registry.cancel(task);
        }
        tracing::info!(cancelled = active.len(), "engine shutting down");
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            workers: Some(2),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn invalid_config_creates_no_task() {
        let engine = engine();
        let err = engine
            .submit(
                DocumentRef::bytes("a.txt", "Some text here."),
                SubmitConfig::default().with_max_chunks(0),
            )
            .unwrap_err();
        assert!(err.is_invalid_config());
        let err = engine
            .submit(
                DocumentRef::bytes("a.txt", "Some text here."),
                SubmitConfig::default().with_threshold(1.5),
            )
            .unwrap_err();
        assert!(err.is_invalid_config());
        assert!(engine.list_tasks().is_empty());
    }

    #[test]
    fn unknown_task_is_not_found() {
        let engine = engine();
        let ghost = TaskId::new(999).unwrap();
        assert!(engine.get_status(ghost).unwrap_err().is_task_not_found());
        assert!(engine.get_result(ghost).unwrap_err().is_task_not_found());
        assert!(engine.cancel(ghost).unwrap_err().is_task_not_found());
    }

    #[test]
    fn submitted_job_completes() {
        let engine = engine();
        let task = engine
            .submit(
                DocumentRef::bytes(
                    "notes.txt",
                    "Install the agent first. Then configure the agent carefully. \
                     Verify the agent reports back.",
                ),
                SubmitConfig::default().with_max_chunks(2),
            )
            .unwrap();
        let status = engine.wait(task, Duration::from_secs(30)).unwrap();
        assert_eq!(status.state, TaskState::Completed);
        let result = engine.get_result(task).unwrap();
        assert_eq!(result.chunks.len(), 2);
        let removed = engine.remove(task).unwrap();
        assert_eq!(removed.id, task);
        assert!(engine.list_tasks().is_empty());
    }

    #[test]
    fn shutdown_rejects_new_jobs() {
        let engine = engine();
        engine.shutdown();
        let err = engine
            .submit(DocumentRef::bytes("a.txt", "Text."), SubmitConfig::default())
            .unwrap_err();
        assert!(matches!(err, crate::error::CrossrefError::Engine(EngineError::ShutDown)));
    }

    #[test]
    fn invalid_engine_config_is_rejected() {
        let result = Engine::new(EngineConfig {
            workers: Some(0),
            ..EngineConfig::default()
        });
        assert!(result.is_err());
    }
}
