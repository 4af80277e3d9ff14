use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::document::DocumentStatus;
use crate::error::FailureClass;
use crate::pipeline::{Pipeline, PipelineContext, PipelineError, ProcessOutcome};
use crate::sanitize;

use super::job::Job;
use super::recovery::{DeadLetterRecovery, EXHAUSTED_MESSAGE};
use super::retry::RetryPolicy;

/// What happened to a dequeued job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        document_id: String,
        document_number: Option<String>,
        confidence: f64,
    },
    /// Scheduled for another attempt after `delay`.
    Retrying {
        document_id: String,
        attempts: u32,
        delay: Duration,
    },
    DeadLettered {
        document_id: String,
        attempts: u32,
    },
    /// Failed without consuming the retry budget. `attempts` excludes the
    /// failed attempt, so the job never counts as exhausted and is not
    /// dead-lettered.
    Failed {
        document_id: String,
        attempts: u32,
        error: String,
    },
    Duplicate {
        document_id: String,
        status: DocumentStatus,
    },
    DocumentMissing {
        document_id: String,
    },
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    /// The poll timed out with an empty queue.
    Idle,
    Handled(JobOutcome),
    /// A shared collaborator failed; the caller should pause before polling again.
    Backoff,
}

/// A single sequential queue consumer.
pub struct Worker {
    id: usize,
    pipeline: Pipeline,
    retry: RetryPolicy,
    recovery: DeadLetterRecovery,
}

impl Worker {
    pub fn new(id: usize, ctx: PipelineContext) -> Self {
        let retry = RetryPolicy::from_settings(&ctx.config.queue);
        let recovery = DeadLetterRecovery::new(
            Arc::clone(&ctx.queue),
            Arc::clone(&ctx.store),
            ctx.config.queue.dead_letter_queue.clone(),
        );
        Self {
            id,
            pipeline: Pipeline::new(ctx),
            retry,
            recovery,
        }
    }

    fn ctx(&self) -> &PipelineContext {
        self.pipeline.context()
    }

    /// Loops until `shutdown` is set. The flag is checked between jobs, so
    /// a job in flight always runs to completion.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        debug!("Worker {} started", self.id);
        let backoff = self.ctx().config.queue.error_backoff;

        while !shutdown.load(Ordering::Relaxed) {
            if let Iteration::Backoff = self.run_once().await {
                tokio::time::sleep(backoff).await;
            }
        }

        debug!("Worker {} stopped", self.id);
    }

    /// Promotes due retries, waits for one job and handles it.
    pub async fn run_once(&self) -> Iteration {
        let settings = &self.ctx().config.queue;
        let queue = &self.ctx().queue;

        match queue.promote_due(&settings.queue_name, Utc::now()).await {
            Ok(0) => {}
            Ok(n) => debug!(promoted = n, "Promoted delayed retries"),
            Err(e) => {
                warn!(error = %e, "Failed to promote delayed retries");
                return Iteration::Backoff;
            }
        }

        let iteration = match queue
            .blocking_pop(&settings.queue_name, settings.poll_timeout)
            .await
        {
            Ok(Some(payload)) => self.handle(payload).await,
            Ok(None) => Iteration::Idle,
            Err(e) => {
                warn!(error = %e, "Failed to poll job queue");
                return Iteration::Backoff;
            }
        };

        self.maybe_recover().await;
        iteration
    }

    async fn maybe_recover(&self) {
        let probability = self.ctx().config.queue.maintenance_probability;
        if probability <= 0.0 || rand::random::<f64>() >= probability {
            return;
        }
        if let Err(e) = self.recovery.run().await {
            warn!(error = %e, "Dead-letter recovery failed");
        }
    }

    async fn handle(&self, payload: String) -> Iteration {
        let mut job = match Job::decode(&payload, self.ctx().config.queue.max_attempts) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, payload = %sanitize::diagnostic(&payload), "Dropping malformed job");
                return Iteration::Handled(JobOutcome::Malformed);
            }
        };

        if job.is_exhausted() {
            return self.dead_letter(job, EXHAUSTED_MESSAGE.to_string(), &payload).await;
        }

        job.begin(Utc::now());
        match self.pipeline.process(&job).await {
            Ok(ProcessOutcome::Processed {
                document_number,
                confidence,
            }) => {
                job.complete(Utc::now());
                Iteration::Handled(JobOutcome::Completed {
                    document_id: job.document_id,
                    document_number,
                    confidence,
                })
            }
            Ok(ProcessOutcome::Duplicate(status)) => {
                info!(job_id = %job.id, document_id = %job.document_id, status = %status, "Dropping duplicate delivery");
                Iteration::Handled(JobOutcome::Duplicate {
                    document_id: job.document_id,
                    status,
                })
            }
            Ok(ProcessOutcome::Missing) => {
                warn!(job_id = %job.id, document_id = %job.document_id, "Dropping job for unknown document");
                Iteration::Handled(JobOutcome::DocumentMissing {
                    document_id: job.document_id,
                })
            }
            Err(err) => self.handle_failure(job, err, &payload).await,
        }
    }

    async fn handle_failure(&self, mut job: Job, err: PipelineError, payload: &str) -> Iteration {
        let message = sanitize::diagnostic(&err.to_string());

        match err.class() {
            FailureClass::Infrastructure => {
                warn!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    kind = err.kind(),
                    error = %message,
                    "Collaborator unavailable, returning job to the queue"
                );
                self.restore(payload).await;
                Iteration::Backoff
            }
            FailureClass::Permanent => {
                warn!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    kind = err.kind(),
                    error = %message,
                    "Job failed permanently"
                );
                if let Err(e) = self
                    .ctx()
                    .store
                    .update_status(&job.document_id, DocumentStatus::Failed, Some(&message))
                    .await
                {
                    warn!(error = %e, "Failed to record failure, returning job to the queue");
                    self.restore(payload).await;
                    return Iteration::Backoff;
                }
                job.abandon(message.clone(), Utc::now());
                Iteration::Handled(JobOutcome::Failed {
                    document_id: job.document_id,
                    attempts: job.attempts,
                    error: message,
                })
            }
            FailureClass::Transient if job.can_retry() => self.retry(job, message, payload).await,
            FailureClass::Transient => self.dead_letter(job, message, payload).await,
        }
    }

    async fn retry(&self, mut job: Job, message: String, payload: &str) -> Iteration {
        let ctx = self.ctx();
        let queue_name = &ctx.config.queue.queue_name;
        let delay = self.retry.delay_after(job.attempts);
        let now = Utc::now();
        job.requeue(message.clone(), now);

        let next = match job.to_payload() {
            Ok(next) => next,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to encode job for retry");
                self.restore(payload).await;
                return Iteration::Backoff;
            }
        };

        let scheduled = if delay.is_zero() {
            ctx.queue.push(queue_name, &next).await
        } else {
            let ready_at = now
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
            ctx.queue.schedule(queue_name, &next, ready_at).await
        };
        if let Err(e) = scheduled {
            warn!(job_id = %job.id, error = %e, "Failed to schedule retry");
            self.restore(payload).await;
            return Iteration::Backoff;
        }

        // Still Processing; record why the attempt failed.
        if let Err(e) = ctx
            .store
            .update_status(&job.document_id, DocumentStatus::Processing, Some(&message))
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to record retry reason");
        }

        info!(
            job_id = %job.id,
            document_id = %job.document_id,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            delay_secs = delay.as_secs(),
            error = %message,
            "Job scheduled for retry"
        );
        Iteration::Handled(JobOutcome::Retrying {
            document_id: job.document_id,
            attempts: job.attempts,
            delay,
        })
    }

    /// Parks the job in the dead-letter list, then fails its document. If
    /// the store write fails the entry is still listed and recovery
    /// finishes the job later.
    async fn dead_letter(&self, mut job: Job, message: String, payload: &str) -> Iteration {
        let ctx = self.ctx();
        job.fail(message.clone(), Utc::now());

        let entry = match job.to_payload() {
            Ok(entry) => entry,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to encode dead-letter entry");
                self.restore(payload).await;
                return Iteration::Backoff;
            }
        };
        if let Err(e) = ctx.queue.push(&ctx.config.queue.dead_letter_queue, &entry).await {
            warn!(job_id = %job.id, error = %e, "Failed to dead-letter job");
            self.restore(payload).await;
            return Iteration::Backoff;
        }

        if let Err(e) = ctx
            .store
            .update_status(&job.document_id, DocumentStatus::Failed, Some(&message))
            .await
        {
            warn!(job_id = %job.id, error = %e, "Dead-lettered job's document not yet marked failed");
        }

        error!(
            job_id = %job.id,
            document_id = %job.document_id,
            attempts = job.attempts,
            error = %message,
            "Job exhausted its retries"
        );
        Iteration::Handled(JobOutcome::DeadLettered {
            document_id: job.document_id,
            attempts: job.attempts,
        })
    }

    /// Puts the original payload back so the job is not lost.
    async fn restore(&self, payload: &str) {
        let ctx = self.ctx();
        if let Err(e) = ctx.queue.push(&ctx.config.queue.queue_name, payload).await {
            error!(error = %e, payload = %sanitize::diagnostic(payload), "Job could not be returned to the queue");
        }
    }
}
