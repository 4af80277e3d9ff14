//! Finalizes jobs parked in the dead-letter list.
//!
//! Dead-lettered jobs are never re-queued automatically. Recovery makes sure
//! each one's document ended up Failed and then drops the entry.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::document::DocumentStatus;
use crate::error::DocflowError;
use crate::queue::JobQueue;
use crate::sanitize;
use crate::store::DocumentStore;

use super::job::Job;

pub const EXHAUSTED_MESSAGE: &str = "retry budget exhausted";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub examined: usize,
    /// Documents this pass moved to Failed.
    pub marked_failed: usize,
    pub already_failed: usize,
    /// Entries deleted from the dead-letter list.
    pub removed: usize,
    pub malformed: usize,
    /// Entries whose document was missing or could not be failed.
    pub skipped: usize,
}

pub struct DeadLetterRecovery {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn DocumentStore>,
    dead_letter_queue: String,
}

impl DeadLetterRecovery {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn DocumentStore>,
        dead_letter_queue: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            store,
            dead_letter_queue: dead_letter_queue.into(),
        }
    }

    /// Drains the dead-letter list once.
    ///
    /// A store failure stops the pass; entries not yet handled stay listed
    /// for the next one.
    pub async fn run(&self) -> Result<RecoveryReport, DocflowError> {
        let entries = self.queue.list_all(&self.dead_letter_queue).await?;
        let mut report = RecoveryReport::default();
        if entries.is_empty() {
            return Ok(report);
        }

        for payload in entries {
            report.examined += 1;

            match Job::from_payload(&payload) {
                Ok(job) => self.finalize(&job, &mut report).await?,
                Err(e) => {
                    warn!(error = %e, payload = %sanitize::diagnostic(&payload), "Dropping malformed dead-letter entry");
                    report.malformed += 1;
                }
            }

            report.removed += self.queue.remove(&self.dead_letter_queue, &payload).await?;
        }

        info!(
            examined = report.examined,
            marked_failed = report.marked_failed,
            already_failed = report.already_failed,
            removed = report.removed,
            malformed = report.malformed,
            skipped = report.skipped,
            "Dead-letter recovery pass finished"
        );
        Ok(report)
    }

    async fn finalize(&self, job: &Job, report: &mut RecoveryReport) -> Result<(), DocflowError> {
        let id = job.document_id.as_str();
        let Some(doc) = self.store.get_by_id(id).await? else {
            warn!(job_id = %job.id, document_id = %id, "Dead-lettered job has no document");
            report.skipped += 1;
            return Ok(());
        };

        if doc.status == DocumentStatus::Failed {
            report.already_failed += 1;
            return Ok(());
        }

        let message = job.error_message.as_deref().unwrap_or(EXHAUSTED_MESSAGE);
        if self
            .store
            .update_status(id, DocumentStatus::Failed, Some(message))
            .await?
        {
            debug!(job_id = %job.id, document_id = %id, "Marked dead-lettered document failed");
            report.marked_failed += 1;
        } else {
            warn!(
                job_id = %job.id,
                document_id = %id,
                status = %doc.status,
                "Dead-lettered document cannot move to Failed"
            );
            report.skipped += 1;
        }
        Ok(())
    }
}
