use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::index::SearchIndexer;
use crate::ocr::OcrInvoker;
use crate::queue::JobQueue;
use crate::store::{DocumentStore, FileSource};
use crate::text::DocumentNumberExtractor;

/// Configuration and collaborator handles shared by every worker.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn DocumentStore>,
    pub files: Arc<dyn FileSource>,
    pub indexer: Arc<dyn SearchIndexer>,
    pub ocr: OcrInvoker,
    pub extractor: Arc<DocumentNumberExtractor>,
}

impl PipelineContext {
    /// Compiles the extractor from `config` and bundles the collaborators.
    pub fn new(
        config: Arc<PipelineConfig>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn DocumentStore>,
        files: Arc<dyn FileSource>,
        indexer: Arc<dyn SearchIndexer>,
        ocr: OcrInvoker,
    ) -> Result<Self, ConfigError> {
        let extractor = Arc::new(DocumentNumberExtractor::new(&config.extraction)?);
        Ok(Self {
            config,
            queue,
            store,
            files,
            indexer,
            ocr,
            extractor,
        })
    }
}
