//! Isolated pipeline environment for integration tests.
//!
//! Uses the in-memory queue, an in-memory SQLite store, files in a temp
//! directory and a scripted OCR engine. Retries re-push immediately and
//! timeouts are short so scenarios run in milliseconds.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docflow::config::PipelineConfig;
use docflow::document::Document;
use docflow::ocr::{DocumentFormat, OcrBackend, OcrInvoker};
use docflow::pipeline::PipelineContext;
use docflow::queue::{JobQueue, MemoryQueue};
use docflow::store::{DocumentStore, FileSource, LocalFileSource, SqliteDocumentStore};
use docflow::worker::{DeadLetterRecovery, Job, Worker};
use docflow::Database;

use super::fakes::{OcrStep, OutageStore, RecordingIndexer, ScriptedOcr};

/// Smallest content the format sniffer accepts as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

pub struct TestHarness {
    temp_dir: TempDir,
    pub storage_root: PathBuf,
    pub config: Arc<PipelineConfig>,
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<OutageStore>,
    pub indexer: Arc<RecordingIndexer>,
    pub ocr: Arc<ScriptedOcr>,
}

impl TestHarness {
    pub fn new(steps: Vec<OcrStep>) -> Self {
        Self::with_config(steps, |_| {})
    }

    /// Builds a harness after letting `tune` adjust the test defaults.
    pub fn with_config(steps: Vec<OcrStep>, tune: impl FnOnce(&mut PipelineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage_root = temp_dir.path().join("storage");
        std::fs::create_dir_all(storage_root.join("uploads")).expect("Failed to create storage dir");

        let mut config = PipelineConfig::default();
        config.ocr.timeout = Duration::from_millis(200);
        config.queue.poll_timeout = Duration::from_millis(50);
        config.queue.retry_delay = Duration::ZERO;
        config.queue.error_backoff = Duration::from_millis(10);
        config.queue.maintenance_probability = 0.0;
        config.connections.storage_root = storage_root.clone();
        tune(&mut config);

        let db = Database::open_in_memory().expect("Failed to open database");
        Self {
            temp_dir,
            storage_root,
            config: Arc::new(config),
            queue: Arc::new(MemoryQueue::new()),
            store: Arc::new(OutageStore::new(SqliteDocumentStore::new(db))),
            indexer: Arc::new(RecordingIndexer::default()),
            ocr: Arc::new(ScriptedOcr::new(steps)),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue.queue_name
    }

    pub fn dead_letter_name(&self) -> &str {
        &self.config.queue.dead_letter_queue
    }

    pub fn context(&self) -> PipelineContext {
        let backend: Arc<dyn OcrBackend> = Arc::clone(&self.ocr) as Arc<dyn OcrBackend>;
        let ocr = OcrInvoker::new(
            backend,
            self.config.ocr.max_file_size,
            vec![
                DocumentFormat::Pdf,
                DocumentFormat::Png,
                DocumentFormat::Jpeg,
                DocumentFormat::Tiff,
            ],
        );
        let queue: Arc<dyn JobQueue> = Arc::clone(&self.queue) as Arc<dyn JobQueue>;
        let store: Arc<dyn DocumentStore> = Arc::clone(&self.store) as Arc<dyn DocumentStore>;
        let files: Arc<dyn FileSource> = Arc::new(LocalFileSource::new(&self.storage_root));
        PipelineContext::new(
            Arc::clone(&self.config),
            queue,
            store,
            files,
            Arc::clone(&self.indexer) as _,
            ocr,
        )
        .expect("Failed to build pipeline context")
    }

    pub fn worker(&self) -> Worker {
        Worker::new(0, self.context())
    }

    pub fn recovery(&self) -> DeadLetterRecovery {
        DeadLetterRecovery::new(
            Arc::clone(&self.queue) as Arc<dyn JobQueue>,
            Arc::clone(&self.store) as Arc<dyn DocumentStore>,
            self.dead_letter_name(),
        )
    }

    /// Stores a file and a Pending document without queueing a job.
    pub async fn insert_document(&self, id: &str, content: &[u8]) -> Document {
        let key = format!("uploads/{}.png", id);
        std::fs::write(self.storage_root.join(&key), content).expect("Failed to write upload");

        let doc = Document::new(id, key, format!("Document {}", id));
        self.store
            .inner()
            .insert(doc.clone())
            .await
            .expect("Failed to insert document");
        doc
    }

    /// Uploads a PNG and enqueues its job, like the upload endpoint does.
    pub async fn upload(&self, id: &str) -> Job {
        self.upload_bytes(id, PNG_BYTES).await
    }

    pub async fn upload_bytes(&self, id: &str, content: &[u8]) -> Job {
        self.insert_document(id, content).await;
        let job = Job::new(id, self.config.queue.max_attempts);
        self.enqueue(&job).await;
        job
    }

    pub async fn enqueue(&self, job: &Job) {
        let payload = job.to_payload().expect("Failed to encode job");
        self.queue
            .push(self.queue_name(), &payload)
            .await
            .expect("Failed to push job");
    }

    pub async fn document(&self, id: &str) -> Document {
        self.store
            .inner()
            .get_by_id(id)
            .await
            .expect("Failed to read document")
            .expect("Document missing")
    }

    pub async fn queued_jobs(&self) -> Vec<Job> {
        self.jobs_in(self.queue_name()).await
    }

    pub async fn dead_letters(&self) -> Vec<Job> {
        self.jobs_in(self.dead_letter_name()).await
    }

    async fn jobs_in(&self, list: &str) -> Vec<Job> {
        self.queue
            .list_all(list)
            .await
            .expect("Failed to list queue")
            .iter()
            .map(|payload| Job::from_payload(payload).expect("Malformed payload in queue"))
            .collect()
    }
}
