use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A queued request to run the pipeline for one document.
///
/// Jobs only exist as serialized payloads in the queue or the dead-letter
/// list. `attempts` counts started attempts and never exceeds
/// `max_attempts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    /// Producers write this as a number or a string.
    #[serde(deserialize_with = "document_id_from_any")]
    pub document_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Malformed job payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid job payload: {0}")]
    Invalid(&'static str),
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn document_id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

impl Job {
    /// Creates a `Queued` job for a freshly uploaded document.
    pub fn new(document_id: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decodes and validates a queue payload. An `attempts` value above
    /// `maxAttempts` is clamped.
    pub fn from_payload(payload: &str) -> Result<Self, PayloadError> {
        Self::decode(payload, DEFAULT_MAX_ATTEMPTS)
    }

    /// Like [`Job::from_payload`], but a payload without `maxAttempts`
    /// gets `default_max_attempts` instead of the built-in default.
    pub fn decode(payload: &str, default_max_attempts: u32) -> Result<Self, PayloadError> {
        let mut value: serde_json::Value = serde_json::from_str(payload)?;
        if let Some(fields) = value.as_object_mut() {
            if fields.get("maxAttempts").map_or(true, serde_json::Value::is_null) {
                fields.insert("maxAttempts".to_string(), default_max_attempts.max(1).into());
            }
        }

        let mut job: Job = serde_json::from_value(value)?;
        if job.document_id.trim().is_empty() {
            return Err(PayloadError::Invalid("documentId is empty"));
        }
        if job.max_attempts == 0 {
            return Err(PayloadError::Invalid("maxAttempts must be positive"));
        }
        job.attempts = job.attempts.min(job.max_attempts);
        Ok(job)
    }

    pub fn to_payload(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// No attempt is left to start.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Another attempt may follow a failure of the current one.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Starts an attempt.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Puts the job back in line after a retryable failure.
    pub fn requeue(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.error_message = Some(error.into());
        self.updated_at = now;
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.error_message = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Fails the job without charging the attempt that just started.
    pub fn abandon(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        if self.status == JobStatus::Processing {
            self.attempts = self.attempts.saturating_sub(1);
        }
        self.fail(error, now);
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
