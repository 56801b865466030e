//! Bounded execution queue with timeouts and retries.
//!
//! [`ExecutionQueue`] runs [`RunRequest`]s on the tokio runtime. A semaphore
//! bounds the number of concurrent runs; each attempt races a timeout; runs
//! that fail with a retryable error are retried with exponential backoff,
//! resuming from the checkpoint of the failed attempt when one was kept.
//! Jobs can be cancelled until they acquire a slot.

mod config;
mod source;

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use config::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_RUNS, DEFAULT_TASK_TIMEOUT_SECS, QueueConfig,
    RetryConfig,
};
pub use source::{DirectorySource, SharedSource, StaticSource, WorkflowSource};

use crate::context::ExecutionId;
use crate::engine::{Engine, ExecutionResult, RunRequest};
use crate::error::{WorkflowError, WorkflowResult};
use crate::store::ExecutionStatus;

/// Tracing target for queue operations.
pub const TRACING_TARGET: &str = "weaver_runtime::queue";

/// Terminal failure of a queued job.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The job was cancelled before it started.
    #[error("job cancelled before start")]
    Cancelled,

    /// The queue stopped accepting work.
    #[error("queue is closed")]
    Closed,

    /// Every attempt exceeded the task timeout.
    #[error("job timed out after {attempts} attempt(s) of {timeout_secs}s")]
    TimedOut {
        /// Attempts made.
        attempts: u32,
        /// Per-attempt timeout.
        timeout_secs: u64,
    },

    /// The engine returned an error.
    #[error("job failed after {attempts} attempt(s): {source}")]
    Workflow {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        #[source]
        source: WorkflowError,
    },

    /// The job task panicked or was aborted.
    #[error("job task failed: {0}")]
    Join(String),
}

/// Final result of a queued job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Result of the last attempt.
    pub result: ExecutionResult,
    /// Attempts made.
    pub attempts: u32,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<JobOutcome, QueueError>>,
}

impl JobHandle {
    /// Returns the job id.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Cancels the job if it has not started. Started jobs run to completion.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Returns whether the job finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the final result.
    pub async fn wait(self) -> Result<JobOutcome, QueueError> {
        self.task
            .await
            .map_err(|error| QueueError::Join(error.to_string()))?
    }
}

/// How one attempt ended.
enum Attempt {
    Finished(ExecutionResult),
    Errored(WorkflowError),
    TimedOut(Duration),
}

/// Queue of workflow runs over a shared engine.
#[derive(Clone)]
pub struct ExecutionQueue {
    engine: Arc<Engine>,
    source: SharedSource,
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    shutdown_token: CancellationToken,
}

impl std::fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("config", &self.config)
            .field("available_permits", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

impl ExecutionQueue {
    /// Creates a queue.
    pub fn new(engine: Engine, source: impl WorkflowSource + 'static, config: QueueConfig) -> Self {
        let permits = config.max_concurrent_runs.max(1);
        tracing::info!(
            target: TRACING_TARGET,
            max_concurrent_runs = permits,
            task_timeout_secs = config.task_timeout_secs,
            max_attempts = config.retry.attempts(),
            "Execution queue initialized"
        );

        Self {
            engine: Arc::new(engine),
            source: Arc::new(source),
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the number of free run slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Cancels every job that has not started and closes the queue.
    pub fn shutdown(&self) {
        tracing::info!(target: TRACING_TARGET, "Shutdown requested, cancelling pending jobs");
        self.shutdown_token.cancel();
        self.semaphore.close();
    }

    /// Submits a run.
    pub fn submit(&self, request: RunRequest) -> JobHandle {
        let job_id = Uuid::now_v7();
        let cancel_token = self.shutdown_token.child_token();

        tracing::debug!(
            target: TRACING_TARGET,
            job_id = %job_id,
            workflow_id = %request.workflow_id,
            "Job submitted"
        );

        let queue = self.clone();
        let token = cancel_token.clone();
        let task = tokio::spawn(async move { queue.run_job(job_id, request, token).await });

        JobHandle {
            job_id,
            cancel_token,
            task,
        }
    }

    async fn run_job(
        self,
        job_id: Uuid,
        mut request: RunRequest,
        cancel_token: CancellationToken,
    ) -> Result<JobOutcome, QueueError> {
        let _permit = tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                tracing::info!(target: TRACING_TARGET, job_id = %job_id, "Job cancelled before start");
                return Err(QueueError::Cancelled);
            }

            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| QueueError::Closed)?
            }
        };

        let max_attempts = self.config.retry.attempts();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let execution_id = *request.execution_id.get_or_insert_with(ExecutionId::new);
            tracing::info!(
                target: TRACING_TARGET,
                job_id = %job_id,
                workflow_id = %request.workflow_id,
                execution_id = %execution_id,
                attempt,
                max_attempts,
                resume_from = ?request.resume_from,
                "Running job attempt"
            );

            let outcome = self.attempt(&request).await;
            let retries_left = attempt < max_attempts;
            match outcome {
                Attempt::Finished(result) if result.is_failed() && result.retryable && retries_left => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        job_id = %job_id,
                        execution_id = %result.execution_id,
                        error = ?result.error,
                        "Run failed with a retryable error"
                    );
                    if result.can_resume {
                        self.clear_superseded(request.resume_from, &result).await;
                        request.resume_from = Some(result.execution_id);
                    }
                }
                Attempt::Finished(result) => {
                    self.clear_superseded(request.resume_from, &result).await;
                    tracing::info!(
                        target: TRACING_TARGET,
                        job_id = %job_id,
                        execution_id = %result.execution_id,
                        status = %result.status,
                        attempts = attempt,
                        "Job finished"
                    );
                    return Ok(JobOutcome {
                        result,
                        attempts: attempt,
                    });
                }
                Attempt::Errored(error) if error.is_retryable() && retries_left => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        job_id = %job_id,
                        error = %error,
                        "Job attempt errored"
                    );
                }
                Attempt::Errored(error) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        job_id = %job_id,
                        error = %error,
                        attempts = attempt,
                        "Job failed"
                    );
                    return Err(QueueError::Workflow {
                        attempts: attempt,
                        source: error,
                    });
                }
                Attempt::TimedOut(elapsed) if retries_left => {
                    self.fail_timed_out(execution_id, elapsed).await;
                    tracing::warn!(
                        target: TRACING_TARGET,
                        job_id = %job_id,
                        timeout_secs = self.config.task_timeout_secs,
                        "Job attempt timed out"
                    );
                }
                Attempt::TimedOut(elapsed) => {
                    self.fail_timed_out(execution_id, elapsed).await;
                    tracing::error!(
                        target: TRACING_TARGET,
                        job_id = %job_id,
                        attempts = attempt,
                        "Job timed out"
                    );
                    return Err(QueueError::TimedOut {
                        attempts: attempt,
                        timeout_secs: self.config.task_timeout_secs,
                    });
                }
            }

            // Each attempt is a new execution.
            request.execution_id = None;
            let backoff = self.config.retry.backoff(attempt - 1);
            tracing::debug!(
                target: TRACING_TARGET,
                job_id = %job_id,
                attempt,
                backoff_ms = backoff.as_millis(),
                "Retrying job after backoff"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn attempt(&self, request: &RunRequest) -> Attempt {
        let clock = Instant::now();
        let run = self.load_and_execute(request);
        let outcome = match self.config.task_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(outcome) => outcome,
                Err(_) => return Attempt::TimedOut(clock.elapsed()),
            },
            None => run.await,
        };

        match outcome {
            Ok(result) => Attempt::Finished(result),
            Err(error) => Attempt::Errored(error),
        }
    }

    /// Marks the record of an attempt dropped by the timeout as failed.
    async fn fail_timed_out(&self, execution_id: ExecutionId, elapsed: Duration) {
        let store = self.engine.store();
        let mut record = match store.get_execution(execution_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    execution_id = %execution_id,
                    error = %error,
                    "Failed to load timed out execution"
                );
                return;
            }
        };

        record.status = ExecutionStatus::Failed;
        record.error = Some(format!(
            "execution timed out after {}s",
            self.config.task_timeout_secs
        ));
        record.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        record.completed_at = Some(Timestamp::now());
        if let Err(error) = store.update_execution(&record).await {
            tracing::warn!(
                target: TRACING_TARGET,
                execution_id = %execution_id,
                error = %error,
                "Failed to mark timed out execution"
            );
        }
    }

    /// Drops the checkpoint a later failed attempt replaced with its own.
    async fn clear_superseded(&self, previous: Option<ExecutionId>, result: &ExecutionResult) {
        let Some(previous) = previous else {
            return;
        };
        if !result.can_resume || previous == result.execution_id {
            return;
        }
        if let Err(error) = self.engine.checkpoints().clear_checkpoint(previous).await {
            tracing::warn!(
                target: TRACING_TARGET,
                execution_id = %previous,
                error = %error,
                "Failed to clear superseded checkpoint"
            );
        }
    }

    async fn load_and_execute(&self, request: &RunRequest) -> WorkflowResult<ExecutionResult> {
        let workflow = self
            .source
            .load_workflow(&request.workflow_id, &request.organization_id)
            .await?;
        self.engine.execute(&workflow, request.clone()).await
    }
}
