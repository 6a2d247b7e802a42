//! Job Queue & Worker (C7): a durable queue backed by the `jobs` Postgres
//! table rather than an external broker, claimed with `FOR UPDATE SKIP
//! LOCKED` exactly like the host codebase's outbox dispatch protocol
//! (`facnet_db::jobs`). This crate owns the worker-pool loop; the actual job
//! handler (C8's `run_validation`) is supplied by the caller through
//! [`JobHandler`] so this crate never depends on the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use facnet_db::jobs;
use facnet_redaction::TelemetryRedactor;
use facnet_schemas::Job;
use sqlx::PgPool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Distinguishes retryable from fatal job failures (spec.md §7's
/// persistence-transient vs persistence-integrity split). A handler that
/// returns a bare `anyhow::Error` (no `JobError` downcast) is treated as
/// transient, matching the host codebase's default assumption that a
/// failure is worth retrying unless proven otherwise.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("fatal failure: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, validation_run_id: Uuid) -> anyhow::Result<()>;
}

pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub drain_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            poll_interval: Duration::from_millis(500),
            batch_size: 1,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Idempotently enqueues a validation run for processing. Returns `true` if
/// a new job row was created, `false` if one already existed for this run
/// (crash-restart re-enqueue is a no-op, spec.md §8 property 7).
pub async fn enqueue(pool: &PgPool, validation_run_id: Uuid, max_attempts: i32) -> anyhow::Result<bool> {
    jobs::enqueue_job(pool, validation_run_id, max_attempts).await
}

/// Fixed pool of worker tasks, each running a claim-process-ack loop. Every
/// task shares one `CancellationToken`; shutdown cancels it and waits up to
/// `drain_timeout` for in-flight jobs to finish their current batch before
/// returning, mirroring the bounded-wait shutdown idiom in the host
/// codebase's daemon.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    pool: PgPool,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(pool: PgPool, handler: Arc<dyn JobHandler>, config: WorkerPoolConfig) -> Self {
        Self {
            config,
            pool,
            handler,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns `worker_count` tasks and waits for them all to finish (either
    /// because `token.cancel()` was called and the drain window elapsed, or
    /// because a task panicked). Returns once every worker has stopped.
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let pool = self.pool.clone();
            let handler = self.handler.clone();
            let cancel = self.cancel.clone();
            let poll_interval = self.config.poll_interval;
            let batch_size = self.config.batch_size;
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, pool, handler, cancel, poll_interval, batch_size).await;
            }));
        }

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(self.config.drain_timeout, drain).await.is_err() {
            tracing::warn!("worker pool drain window elapsed, in-flight jobs were not awaited to completion");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    pool: PgPool,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
    poll_interval: Duration,
    batch_size: i64,
) {
    let claimed_by = format!("worker-{worker_id}");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(worker_id, "shutdown requested, worker exiting");
                return;
            }
            claimed = jobs::claim_batch(&pool, batch_size, &claimed_by) => {
                match claimed {
                    Ok(batch) if batch.is_empty() => {
                        tokio::select! {
                            _ = tokio::time::sleep(poll_interval) => {}
                            _ = cancel.cancelled() => return,
                        }
                    }
                    Ok(batch) => {
                        for job in batch {
                            process_one(&pool, handler.as_ref(), &job).await;
                        }
                    }
                    Err(err) => {
                        tracing::error!(worker_id, error = %err, "claim_batch failed");
                        tokio::select! {
                            _ = tokio::time::sleep(poll_interval) => {}
                            _ = cancel.cancelled() => return,
                        }
                    }
                }
            }
        }
    }
}

async fn process_one(pool: &PgPool, handler: &dyn JobHandler, job: &Job) {
    match handler.handle(job.validation_run_id).await {
        Ok(()) => {
            if let Err(err) = jobs::mark_job_done(pool, job.id).await {
                tracing::error!(job_id = %job.id, error = %err, "mark_job_done failed");
            }
        }
        Err(err) => {
            let sanitized = TelemetryRedactor::redact_text(&err.to_string());
            let is_fatal = err.downcast_ref::<JobError>().is_some_and(|e| matches!(e, JobError::Fatal(_)));
            let outcome = if is_fatal {
                jobs::fail_job_permanently(pool, job.id, &sanitized).await
            } else {
                jobs::retry_or_fail_job(pool, job.id, &sanitized).await
            };
            if let Err(db_err) = outcome {
                tracing::error!(job_id = %job.id, error = %db_err, "failed to record job failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_error_defaults_to_retryable() {
        let err = anyhow::anyhow!("connection reset");
        assert!(err.downcast_ref::<JobError>().is_none());
    }

    #[test]
    fn fatal_job_error_downcasts() {
        let err: anyhow::Error = JobError::Fatal("fk violation".to_string()).into();
        let is_fatal = err.downcast_ref::<JobError>().is_some_and(|e| matches!(e, JobError::Fatal(_)));
        assert!(is_fatal);
    }
}
