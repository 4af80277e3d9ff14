//! OCR invocation.
//!
//! One [`OcrBackend`] per engine, selected once at startup from
//! configuration. [`OcrInvoker`] wraps the backend with the checks every
//! engine shares (size, format, engine support) and a hard wall-clock
//! timeout.

pub mod document_ai;
pub mod error;
pub mod format;
pub mod tesseract;
pub mod vision;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

pub use error::OcrError;
pub use format::DocumentFormat;

use crate::config::{OcrEngineKind, OcrSettings};
use crate::error::ConfigError;
use crate::sanitize;

/// One document handed to an engine.
#[derive(Debug, Clone, Copy)]
pub struct OcrInput<'a> {
    pub bytes: &'a [u8],
    pub format: DocumentFormat,
    /// Tesseract-style language code(s).
    pub language: &'a str,
}

/// Raw recognition result.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub engine: &'static str,
    pub engine_version: Option<String>,
}

#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the engine can read this format at all.
    fn supports(&self, format: DocumentFormat) -> bool;

    async fn recognize(&self, input: OcrInput<'_>) -> Result<OcrOutput, OcrError>;
}

/// Maps an unsuccessful HTTP status from a cloud engine to an error.
/// Statuses that blame the document itself are permanent.
pub(crate) fn http_failure(engine: &'static str, status: u16, body: &str) -> OcrError {
    let message = sanitize::diagnostic(body);
    match status {
        400 | 413 | 415 | 422 => OcrError::Rejected {
            engine,
            status,
            message,
        },
        _ => OcrError::Engine {
            engine,
            message: format!("HTTP {}: {}", status, message),
        },
    }
}

#[derive(Clone)]
pub struct OcrInvoker {
    backend: Arc<dyn OcrBackend>,
    max_file_size: u64,
    accepted: Vec<DocumentFormat>,
}

impl OcrInvoker {
    pub fn new(backend: Arc<dyn OcrBackend>, max_file_size: u64, accepted: Vec<DocumentFormat>) -> Self {
        Self {
            backend,
            max_file_size,
            accepted,
        }
    }

    /// Builds the invoker for the engine named in the settings.
    pub fn from_settings(settings: &OcrSettings) -> Result<Self, ConfigError> {
        let backend: Arc<dyn OcrBackend> = match settings.engine {
            OcrEngineKind::Tesseract => Arc::new(tesseract::TesseractBackend::new(
                settings.tesseract.clone(),
                settings.temp_dir.clone(),
            )),
            OcrEngineKind::GoogleVision => {
                let vision = settings.google_vision.as_ref().ok_or_else(|| ConfigError::Missing {
                    key: "GOOGLE_VISION_API_KEY".to_string(),
                })?;
                Arc::new(vision::GoogleVisionBackend::new(http_client()?, vision))
            }
            OcrEngineKind::DocumentAi => {
                let docai = settings.document_ai.as_ref().ok_or_else(|| ConfigError::Missing {
                    key: "DOCUMENT_AI_PROCESSOR".to_string(),
                })?;
                Arc::new(document_ai::DocumentAiBackend::new(http_client()?, docai))
            }
        };

        let mut accepted = Vec::new();
        for name in &settings.supported_formats {
            match DocumentFormat::from_name(name) {
                Some(format) if !accepted.contains(&format) => accepted.push(format),
                Some(_) => {}
                None => log::warn!("Ignoring unknown format '{}' in supported formats", name),
            }
        }

        Ok(Self::new(backend, settings.max_file_size, accepted))
    }

    pub fn engine(&self) -> &'static str {
        self.backend.name()
    }

    /// Rejects input that no engine attempt could succeed on.
    pub fn preflight(&self, bytes: &[u8]) -> Result<DocumentFormat, OcrError> {
        if bytes.is_empty() {
            return Err(OcrError::EmptyInput);
        }
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(OcrError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let format = DocumentFormat::sniff(bytes)
            .ok_or_else(|| OcrError::UnsupportedFormat("unrecognized content".to_string()))?;
        if !self.accepted.contains(&format) {
            return Err(OcrError::UnsupportedFormat(format.to_string()));
        }
        if !self.backend.supports(format) {
            return Err(OcrError::UnsupportedFormat(format!(
                "{} cannot be read by {}",
                format,
                self.backend.name()
            )));
        }
        Ok(format)
    }

    /// Runs the engine on `bytes`, giving up after `timeout`.
    pub async fn invoke(
        &self,
        bytes: &[u8],
        language: &str,
        timeout: Duration,
    ) -> Result<OcrOutput, OcrError> {
        let format = self.preflight(bytes)?;
        let input = OcrInput {
            bytes,
            format,
            language,
        };

        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.backend.recognize(input)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                tracing::debug!(
                    engine = output.engine,
                    format = %format,
                    chars = output.text.chars().count(),
                    elapsed_ms,
                    "OCR finished"
                );
                Ok(output)
            }
            Ok(Err(err)) => {
                tracing::warn!(engine = self.backend.name(), kind = err.kind(), elapsed_ms, error = %err, "OCR failed");
                Err(err)
            }
            Err(_) => {
                tracing::warn!(engine = self.backend.name(), elapsed_ms, "OCR timed out");
                Err(OcrError::Timeout(timeout))
            }
        }
    }
}

fn http_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}
