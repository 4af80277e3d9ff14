use thiserror::Error;

use crate::error::{FailureClass, FileError, IndexError, QueueError, StoreError};
use crate::ocr::OcrError;

/// Anything that can go wrong while handling one job.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Ocr(#[from] OcrError),

    #[error("{0}")]
    File(#[from] FileError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Indexing failed: {0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Queue(#[from] QueueError),
}

impl PipelineError {
    pub fn class(&self) -> FailureClass {
        match self {
            PipelineError::Ocr(e) => e.class(),
            PipelineError::File(e) => e.class(),
            // A row that cannot be decoded will not decode on the next try either.
            PipelineError::Store(StoreError::Corrupt { .. }) => FailureClass::Permanent,
            PipelineError::Store(_) | PipelineError::Queue(_) => FailureClass::Infrastructure,
            PipelineError::Index(_) => FailureClass::Transient,
        }
    }

    /// Short machine-friendly kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Ocr(e) => e.kind(),
            PipelineError::File(_) => "file_error",
            PipelineError::Store(_) => "store_unavailable",
            PipelineError::Index(_) => "index_error",
            PipelineError::Queue(_) => "queue_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classification() {
        let timeout: PipelineError = OcrError::Timeout(Duration::from_secs(300)).into();
        assert_eq!(timeout.class(), FailureClass::Transient);
        assert_eq!(timeout.kind(), "ocr_timeout");

        let unsupported: PipelineError = OcrError::UnsupportedFormat("zip".to_string()).into();
        assert_eq!(unsupported.class(), FailureClass::Permanent);

        let store: PipelineError = StoreError::Unavailable("locked".to_string()).into();
        assert_eq!(store.class(), FailureClass::Infrastructure);

        let queue: PipelineError = QueueError::Unavailable("refused".to_string()).into();
        assert_eq!(queue.class(), FailureClass::Infrastructure);

        let index: PipelineError = IndexError::Request("connection reset".to_string()).into();
        assert_eq!(index.class(), FailureClass::Transient);
    }

    #[test]
    fn test_corrupt_row_is_permanent() {
        let err: PipelineError = StoreError::Corrupt {
            id: "1".to_string(),
            reason: "status: Unknown document status 'DONE'".to_string(),
        }
        .into();
        assert_eq!(err.class(), FailureClass::Permanent);
    }
}
