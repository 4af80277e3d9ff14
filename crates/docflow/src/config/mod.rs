pub mod loader;
pub mod schema;

pub use schema::{
    ConnectionSettings, DocumentAiSettings, ElasticsearchSettings, ExtractionSettings,
    GoogleVisionSettings, OcrEngineKind, OcrSettings, PipelineConfig, QueueSettings,
    TesseractSettings,
};
