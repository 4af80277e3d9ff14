#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use docflow::document::{Document, DocumentStatus, OcrMetadata, SearchDocument};
use docflow::error::{IndexError, StoreError};
use docflow::index::SearchIndexer;
use docflow::ocr::{DocumentFormat, OcrBackend, OcrError, OcrInput, OcrOutput};
use docflow::store::{DocumentStore, SqliteDocumentStore};

/// What the scripted engine does on one call.
#[derive(Debug, Clone)]
pub enum OcrStep {
    Text(String),
    /// Non-zero exit style failure.
    Fail(String),
    /// Never finishes within any test timeout.
    Hang,
    /// The engine refuses the document outright.
    Reject,
}

/// OCR engine that replays a fixed script, then returns empty text.
pub struct ScriptedOcr {
    steps: Mutex<VecDeque<OcrStep>>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(steps: Vec<OcrStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push(&self, step: OcrStep) {
        self.steps.lock().unwrap().push_back(step);
    }
}

#[async_trait]
impl OcrBackend for ScriptedOcr {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, _format: DocumentFormat) -> bool {
        true
    }

    async fn recognize(&self, _input: OcrInput<'_>) -> Result<OcrOutput, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| OcrStep::Text(String::new()));

        match step {
            OcrStep::Text(text) => Ok(OcrOutput {
                text,
                engine: "scripted",
                engine_version: Some("1.0".to_string()),
            }),
            OcrStep::Fail(message) => Err(OcrError::Engine {
                engine: "scripted",
                message,
            }),
            OcrStep::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(OcrError::Engine {
                    engine: "scripted",
                    message: "woke up".to_string(),
                })
            }
            OcrStep::Reject => Err(OcrError::Rejected {
                engine: "scripted",
                status: 400,
                message: "bad image data".to_string(),
            }),
        }
    }
}

/// Indexer that keeps every call in memory.
#[derive(Default)]
pub struct RecordingIndexer {
    indexed: Mutex<Vec<SearchDocument>>,
    removed: Mutex<Vec<String>>,
    failures: AtomicUsize,
}

impl RecordingIndexer {
    /// The next `n` index calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn indexed(&self) -> Vec<SearchDocument> {
        self.indexed.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndexer for RecordingIndexer {
    async fn index(&self, doc: &SearchDocument) -> Result<(), IndexError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(IndexError::Request("connection refused".to_string()));
        }
        self.indexed.lock().unwrap().push(doc.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), IndexError> {
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// SQLite-backed store that can simulate an outage.
pub struct OutageStore {
    inner: SqliteDocumentStore,
    down: AtomicBool,
}

impl OutageStore {
    pub fn new(inner: SqliteDocumentStore) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &SqliteDocumentStore {
        &self.inner
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database is locked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for OutageStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.check()?;
        self.inner.get_by_id(id).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.update_status(id, status, error_message).await
    }

    async fn update_with_ocr_results(
        &self,
        id: &str,
        full_text: &str,
        extracted_doc_number: Option<&str>,
        ocr_metadata: Option<&OcrMetadata>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner
            .update_with_ocr_results(id, full_text, extracted_doc_number, ocr_metadata)
            .await
    }
}
