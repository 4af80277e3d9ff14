use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::telemetry::LogFormat;

/// Immutable settings for one worker process, built once at startup and
/// shared behind an `Arc`.
#[derive(Debug)]
pub struct PipelineConfig {
    pub ocr: OcrSettings,
    pub queue: QueueSettings,
    pub extraction: ExtractionSettings,
    /// Confidence below this marks the OCR metadata as low confidence.
    pub confidence_threshold: f64,
    pub connections: ConnectionSettings,
    pub log_format: LogFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr: OcrSettings::default(),
            queue: QueueSettings::default(),
            extraction: ExtractionSettings::default(),
            confidence_threshold: 0.5,
            connections: ConnectionSettings::default(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngineKind {
    /// Local `tesseract` binary run as a subprocess.
    Tesseract,
    /// Google Cloud Vision `images:annotate`.
    GoogleVision,
    /// Google Document AI processor.
    DocumentAi,
}

impl OcrEngineKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Some(Self::Tesseract),
            "google_vision" | "google-vision" | "vision" => Some(Self::GoogleVision),
            "document_ai" | "document-ai" | "documentai" => Some(Self::DocumentAi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::GoogleVision => "google_vision",
            Self::DocumentAi => "document_ai",
        }
    }

    /// Timeout applied when no engine-specific or global value is configured.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Tesseract => Duration::from_secs(300),
            Self::GoogleVision => Duration::from_secs(60),
            Self::DocumentAi => Duration::from_secs(120),
        }
    }
}

#[derive(Debug)]
pub struct OcrSettings {
    pub engine: OcrEngineKind,
    /// Tesseract-style language code(s), comma or `+` separated (e.g. `eng+deu`).
    pub language: String,
    /// Hard wall-clock bound for one invocation of the selected engine.
    pub timeout: Duration,
    pub max_file_size: u64,
    /// Lowercase format names accepted before invocation (`png`, `pdf`, ...).
    pub supported_formats: Vec<String>,
    /// Directory for per-invocation temp files; system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    pub tesseract: TesseractSettings,
    pub google_vision: Option<GoogleVisionSettings>,
    pub document_ai: Option<DocumentAiSettings>,
}

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub fn default_supported_formats() -> Vec<String> {
    ["jpg", "jpeg", "png", "tiff", "tif", "bmp", "gif", "webp", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: OcrEngineKind::Tesseract,
            language: "eng".to_string(),
            timeout: OcrEngineKind::Tesseract.default_timeout(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            supported_formats: default_supported_formats(),
            temp_dir: None,
            tesseract: TesseractSettings::default(),
            google_vision: None,
            document_ai: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TesseractSettings {
    pub binary_path: PathBuf,
    /// `--psm` value; tesseract's own default when unset.
    pub page_segmentation_mode: Option<u8>,
    /// Exported as `TESSDATA_PREFIX` for the child process.
    pub tessdata_path: Option<PathBuf>,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("tesseract"),
            page_segmentation_mode: None,
            tessdata_path: None,
        }
    }
}

pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Debug)]
pub struct GoogleVisionSettings {
    pub api_key: SecretString,
    pub endpoint: String,
}

#[derive(Debug)]
pub struct DocumentAiSettings {
    /// `projects/P/locations/L/processors/ID`
    pub processor_name: String,
    pub access_token: SecretString,
    /// Overrides the regional `https://L-documentai.googleapis.com` base URL.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub queue_name: String,
    pub dead_letter_queue: String,
    /// Bounded wait of one blocking pop.
    pub poll_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
    /// Pause after an infrastructure failure before the next iteration.
    pub error_backoff: Duration,
    /// Chance per iteration of running dead-letter recovery.
    pub maintenance_probability: f64,
    /// Independent sequential workers started by the worker binary.
    pub concurrency: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            queue_name: "ocr_processing_queue".to_string(),
            dead_letter_queue: "ocr_failed_jobs".to_string(),
            poll_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(15 * 60),
            error_backoff: Duration::from_secs(1),
            maintenance_probability: 0.01,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Operator-supplied regex; group 1 (or the whole match) is the number.
    pub custom_pattern: Option<String>,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            custom_pattern: None,
            min_length: 4,
            max_length: 50,
        }
    }
}

#[derive(Debug)]
pub struct ConnectionSettings {
    /// May embed a password, so it is kept secret.
    pub redis_url: SecretString,
    pub database_path: PathBuf,
    /// Root directory that document storage paths are resolved against.
    pub storage_root: PathBuf,
    pub elasticsearch: ElasticsearchSettings,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            redis_url: SecretString::from("redis://localhost:6379/0".to_string()),
            database_path: PathBuf::from("data/docflow.db"),
            storage_root: PathBuf::from("storage"),
            elasticsearch: ElasticsearchSettings::default(),
        }
    }
}

#[derive(Debug)]
pub struct ElasticsearchSettings {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Sent as `Authorization: ApiKey ...`; takes precedence over basic auth.
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    pub shards: u32,
    pub replicas: u32,
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "documents".to_string(),
            username: None,
            password: None,
            api_key: None,
            timeout: Duration::from_secs(30),
            shards: 1,
            replicas: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!(OcrEngineKind::parse("tesseract"), Some(OcrEngineKind::Tesseract));
        assert_eq!(OcrEngineKind::parse(" Google_Vision "), Some(OcrEngineKind::GoogleVision));
        assert_eq!(OcrEngineKind::parse("documentai"), Some(OcrEngineKind::DocumentAi));
        assert_eq!(OcrEngineKind::parse("aws_textract"), None);
    }

    #[test]
    fn test_engine_default_timeouts() {
        assert_eq!(OcrEngineKind::Tesseract.default_timeout(), Duration::from_secs(300));
        assert_eq!(OcrEngineKind::GoogleVision.default_timeout(), Duration::from_secs(60));
        assert_eq!(OcrEngineKind::DocumentAi.default_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_defaults_follow_deployment_conventions() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue.queue_name, "ocr_processing_queue");
        assert_eq!(config.queue.dead_letter_queue, "ocr_failed_jobs");
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.poll_timeout, Duration::from_secs(10));
        assert_eq!(config.ocr.max_file_size, 10 * 1024 * 1024);
        assert!(config.ocr.supported_formats.contains(&"pdf".to_string()));
        assert_eq!(config.extraction.min_length, 4);
        assert_eq!(config.extraction.max_length, 50);
    }
}
