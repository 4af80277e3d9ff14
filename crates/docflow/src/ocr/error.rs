use std::time::Duration;

use thiserror::Error;

use crate::error::FailureClass;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("OCR engine {engine} failed: {message}")]
    Engine {
        engine: &'static str,
        message: String,
    },

    #[error("Failed to start OCR engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine refused this particular document.
    #[error("OCR engine {engine} rejected the document ({status}): {message}")]
    Rejected {
        engine: &'static str,
        status: u16,
        message: String,
    },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Document is empty")]
    EmptyInput,

    #[error("Document is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Temporary file error: {0}")]
    TempFile(#[source] std::io::Error),
}

impl OcrError {
    pub fn class(&self) -> FailureClass {
        match self {
            OcrError::Timeout(_)
            | OcrError::Engine { .. }
            | OcrError::Spawn { .. }
            | OcrError::TempFile(_) => FailureClass::Transient,
            OcrError::Rejected { .. }
            | OcrError::UnsupportedFormat(_)
            | OcrError::EmptyInput
            | OcrError::TooLarge { .. } => FailureClass::Permanent,
        }
    }

    /// Short machine-friendly kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            OcrError::Timeout(_) => "ocr_timeout",
            OcrError::Engine { .. } => "ocr_engine_error",
            OcrError::Spawn { .. } => "ocr_spawn_error",
            OcrError::Rejected { .. } => "ocr_rejected",
            OcrError::UnsupportedFormat(_) => "unsupported_format",
            OcrError::EmptyInput => "empty_input",
            OcrError::TooLarge { .. } => "too_large",
            OcrError::TempFile(_) => "temp_file",
        }
    }
}
