pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod index;
pub mod ocr;
pub mod pipeline;
pub mod queue;
pub mod sanitize;
pub mod secrets;
pub mod store;
pub mod telemetry;
pub mod text;
pub mod worker;

pub use config::{OcrEngineKind, PipelineConfig};
pub use db::{Database, DatabaseError};
pub use document::{Document, DocumentStatus, OcrMetadata, SearchDocument};
pub use error::{
    ConfigError, DocflowError, FailureClass, FileError, IndexError, QueueError, Result, StoreError,
};
pub use index::{ElasticsearchIndexer, SearchIndexer};
pub use ocr::{OcrBackend, OcrError, OcrInvoker};
pub use pipeline::{Pipeline, PipelineContext, PipelineError};
pub use queue::{JobQueue, MemoryQueue, RedisQueue};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{DocumentStore, FileSource, LocalFileSource, SqliteDocumentStore};
pub use text::DocumentNumberExtractor;
pub use worker::{DeadLetterRecovery, Job, JobStatus, RecoveryReport, Worker, WorkerPool};
