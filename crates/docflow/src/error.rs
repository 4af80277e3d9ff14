use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Search index error: {0}")]
    Index(#[from] IndexError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// How the worker reacts to a failure while handling one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retried with a delay until the job's attempt budget is spent.
    Transient,
    /// Fails the document immediately without consuming retry budget.
    Permanent,
    /// A shared collaborator is down: put the job back and back off.
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing required setting {key}")]
    Missing { key: String },

    #[error("Invalid document number pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Secret resolution failed: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Corrupt row for document '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Stored file not found: {0}")]
    NotFound(PathBuf),

    #[error("Storage path is not allowed: {0}")]
    InvalidPath(String),

    #[error("Failed to read stored file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    pub fn class(&self) -> FailureClass {
        match self {
            FileError::NotFound(_) | FileError::InvalidPath(_) => FailureClass::Permanent,
            FileError::Read { .. } => FailureClass::Transient,
        }
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Search index request failed: {0}")]
    Request(String),

    #[error("Search index rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        IndexError::Request(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_permanent() {
        let err = FileError::NotFound(PathBuf::from("/data/a.png"));
        assert_eq!(err.class(), FailureClass::Permanent);
        assert_eq!(
            FileError::InvalidPath("../etc/passwd".to_string()).class(),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_read_failure_is_transient() {
        let err = FileError::Read {
            path: PathBuf::from("/data/a.png"),
            source: std::io::Error::new(std::io::ErrorKind::Interrupted, "interrupted"),
        };
        assert_eq!(err.class(), FailureClass::Transient);
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidValue {
            key: "OCR_MAX_ATTEMPTS".to_string(),
            value: "zero".to_string(),
            reason: "not a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value 'zero' for OCR_MAX_ATTEMPTS: not a number"
        );

        let err: DocflowError = QueueError::Unavailable("connection refused".to_string()).into();
        assert!(err.to_string().contains("connection refused"));
    }
}
