use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::schema::{
    default_supported_formats, ConnectionSettings, DocumentAiSettings, ElasticsearchSettings,
    ExtractionSettings, GoogleVisionSettings, OcrEngineKind, OcrSettings, PipelineConfig,
    QueueSettings, TesseractSettings, DEFAULT_VISION_ENDPOINT,
};
use crate::error::ConfigError;
use crate::secrets;
use crate::telemetry::LogFormat;

impl PipelineConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset and empty
    /// values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let config = PipelineConfig {
            ocr: load_ocr(&env)?,
            queue: load_queue(&env)?,
            extraction: load_extraction(&env)?,
            confidence_threshold: env.parse("OCR_CONFIDENCE_THRESHOLD", 0.5)?,
            connections: load_connections(&env)?,
            log_format: match env.get("DOCFLOW_LOG_FORMAT") {
                Some(value) => LogFormat::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                    key: "DOCFLOW_LOG_FORMAT".to_string(),
                    value,
                    reason: "expected 'text' or 'json'".to_string(),
                })?,
                None => LogFormat::Text,
            },
        };

        validate(&config)?;
        Ok(config)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn seconds(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(key) {
            Some(_) => Ok(Duration::from_secs(self.parse::<u64>(key, 0)?)),
            None => Ok(default),
        }
    }

    fn secret(&self, key: &str) -> Result<Option<SecretString>, ConfigError> {
        let file_key = format!("{}_FILE", key);
        let direct = self.get(key);
        let file = self.get(&file_key);
        Ok(secrets::resolve_secret_optional(
            direct.as_deref(),
            file.as_deref(),
        )?)
    }

    fn required_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        self.secret(key)?.ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }
}

fn load_ocr<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<OcrSettings, ConfigError> {
    let engine = match env.get("OCR_ENGINE") {
        Some(value) => OcrEngineKind::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
            key: "OCR_ENGINE".to_string(),
            value,
            reason: "expected tesseract, google_vision or document_ai".to_string(),
        })?,
        None => OcrEngineKind::Tesseract,
    };

    let engine_timeout_key = match engine {
        OcrEngineKind::Tesseract => "TESSERACT_TIMEOUT",
        OcrEngineKind::GoogleVision => "GOOGLE_VISION_TIMEOUT",
        OcrEngineKind::DocumentAi => "DOCUMENT_AI_TIMEOUT",
    };
    let fallback_timeout = env.seconds("OCR_TIMEOUT", engine.default_timeout())?;
    let timeout = env.seconds(engine_timeout_key, fallback_timeout)?;

    let supported_formats = match env.get("OCR_SUPPORTED_FORMATS") {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default_supported_formats(),
    };

    let tesseract = TesseractSettings {
        binary_path: PathBuf::from(env.string("TESSERACT_PATH", "tesseract")),
        page_segmentation_mode: match env.get("TESSERACT_PSM") {
            Some(_) => Some(env.parse::<u8>("TESSERACT_PSM", 3)?),
            None => None,
        },
        tessdata_path: env.get("TESSDATA_PREFIX").map(PathBuf::from),
    };

    let google_vision = match engine {
        OcrEngineKind::GoogleVision => Some(GoogleVisionSettings {
            api_key: env.required_secret("GOOGLE_VISION_API_KEY")?,
            endpoint: env.string("GOOGLE_VISION_ENDPOINT", DEFAULT_VISION_ENDPOINT),
        }),
        _ => None,
    };

    let document_ai = match engine {
        OcrEngineKind::DocumentAi => Some(DocumentAiSettings {
            processor_name: env.get("DOCUMENT_AI_PROCESSOR").ok_or_else(|| {
                ConfigError::Missing {
                    key: "DOCUMENT_AI_PROCESSOR".to_string(),
                }
            })?,
            access_token: env.required_secret("DOCUMENT_AI_ACCESS_TOKEN")?,
            endpoint: env.get("DOCUMENT_AI_ENDPOINT"),
        }),
        _ => None,
    };

    Ok(OcrSettings {
        engine,
        language: env.string("OCR_LANGUAGE", "eng"),
        timeout,
        max_file_size: env.parse("OCR_MAX_FILE_SIZE", OcrSettings::default().max_file_size)?,
        supported_formats,
        temp_dir: env.get("OCR_TEMP_DIR").map(PathBuf::from),
        tesseract,
        google_vision,
        document_ai,
    })
}

fn load_queue<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<QueueSettings, ConfigError> {
    let defaults = QueueSettings::default();
    Ok(QueueSettings {
        queue_name: env.string("OCR_QUEUE_NAME", &defaults.queue_name),
        dead_letter_queue: env.string("OCR_FAILED_QUEUE_NAME", &defaults.dead_letter_queue),
        poll_timeout: env.seconds("OCR_POLL_TIMEOUT", defaults.poll_timeout)?,
        max_attempts: env.parse("OCR_MAX_ATTEMPTS", defaults.max_attempts)?,
        retry_delay: env.seconds("OCR_RETRY_DELAY", defaults.retry_delay)?,
        backoff_multiplier: env.parse("OCR_BACKOFF_MULTIPLIER", defaults.backoff_multiplier)?,
        max_retry_delay: env.seconds("OCR_MAX_RETRY_DELAY", defaults.max_retry_delay)?,
        error_backoff: env.seconds("OCR_ERROR_BACKOFF", defaults.error_backoff)?,
        maintenance_probability: env.parse(
            "OCR_MAINTENANCE_PROBABILITY",
            defaults.maintenance_probability,
        )?,
        concurrency: env.parse("OCR_WORKER_CONCURRENCY", defaults.concurrency)?,
    })
}

fn load_extraction<F: Fn(&str) -> Option<String>>(
    env: &Env<F>,
) -> Result<ExtractionSettings, ConfigError> {
    let defaults = ExtractionSettings::default();
    Ok(ExtractionSettings {
        custom_pattern: env.get("CUSTOM_DOC_NUMBER_PATTERN"),
        min_length: env.parse("EXTRACTION_MIN_LENGTH", defaults.min_length)?,
        max_length: env.parse("EXTRACTION_MAX_LENGTH", defaults.max_length)?,
    })
}

fn load_connections<F: Fn(&str) -> Option<String>>(
    env: &Env<F>,
) -> Result<ConnectionSettings, ConfigError> {
    let defaults = ConnectionSettings::default();

    let redis_url = match env.secret("REDIS_URL")? {
        Some(url) => url,
        None => {
            let host = env.string("REDIS_HOST", "localhost");
            let port: u16 = env.parse("REDIS_PORT", 6379)?;
            let db: u32 = env.parse("REDIS_DB", 0)?;
            let url = match env.secret("REDIS_PASSWORD")? {
                Some(password) => {
                    use secrecy::ExposeSecret;
                    format!(
                        "redis://:{}@{}:{}/{}",
                        password.expose_secret(),
                        host,
                        port,
                        db
                    )
                }
                None => format!("redis://{}:{}/{}", host, port, db),
            };
            SecretString::from(url)
        }
    };

    let es_defaults = ElasticsearchSettings::default();
    let es_host = env.string("ELASTICSEARCH_HOST", "localhost:9200");
    let es_url = if es_host.contains("://") {
        es_host
    } else {
        format!("{}://{}", env.string("ELASTICSEARCH_SCHEME", "http"), es_host)
    };

    Ok(ConnectionSettings {
        redis_url,
        database_path: env
            .get("DOCFLOW_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path),
        storage_root: env
            .get("DOCFLOW_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_root),
        elasticsearch: ElasticsearchSettings {
            url: es_url.trim_end_matches('/').to_string(),
            index: env.string("DOCUMENTS_INDEX_NAME", &es_defaults.index),
            username: env.get("ELASTICSEARCH_USER"),
            password: env.secret("ELASTICSEARCH_PASS")?,
            api_key: env.secret("ELASTICSEARCH_KEY")?,
            timeout: env.seconds("ELASTICSEARCH_TIMEOUT", es_defaults.timeout)?,
            shards: env.parse("DOCUMENTS_SHARDS", es_defaults.shards)?,
            replicas: env.parse("DOCUMENTS_REPLICAS", es_defaults.replicas)?,
        },
    })
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.ocr.timeout.is_zero() {
        return Err(invalid("OCR_TIMEOUT", 0, "timeout must be positive"));
    }
    if config.ocr.max_file_size == 0 {
        return Err(invalid("OCR_MAX_FILE_SIZE", 0, "must be positive"));
    }
    if config.ocr.supported_formats.is_empty() {
        return Err(invalid("OCR_SUPPORTED_FORMATS", "", "no formats listed"));
    }
    if !(0.0..=1.0).contains(&config.confidence_threshold) {
        return Err(invalid(
            "OCR_CONFIDENCE_THRESHOLD",
            config.confidence_threshold,
            "must be between 0 and 1",
        ));
    }

    let queue = &config.queue;
    if queue.max_attempts == 0 {
        return Err(invalid("OCR_MAX_ATTEMPTS", 0, "at least one attempt is required"));
    }
    if queue.poll_timeout.is_zero() {
        return Err(invalid("OCR_POLL_TIMEOUT", 0, "must be positive"));
    }
    if !queue.backoff_multiplier.is_finite() || queue.backoff_multiplier < 1.0 {
        return Err(invalid(
            "OCR_BACKOFF_MULTIPLIER",
            queue.backoff_multiplier,
            "must be at least 1.0",
        ));
    }
    if !(0.0..=1.0).contains(&queue.maintenance_probability) {
        return Err(invalid(
            "OCR_MAINTENANCE_PROBABILITY",
            queue.maintenance_probability,
            "must be between 0 and 1",
        ));
    }
    if queue.concurrency == 0 {
        return Err(invalid("OCR_WORKER_CONCURRENCY", 0, "must be at least 1"));
    }
    if queue.queue_name == queue.dead_letter_queue {
        return Err(invalid(
            "OCR_FAILED_QUEUE_NAME",
            &queue.dead_letter_queue,
            "must differ from the work queue",
        ));
    }

    let extraction = &config.extraction;
    if extraction.min_length == 0 || extraction.min_length > extraction.max_length {
        return Err(invalid(
            "EXTRACTION_MIN_LENGTH",
            extraction.min_length,
            "must be positive and not exceed EXTRACTION_MAX_LENGTH",
        ));
    }
    if let Some(pattern) = &extraction.custom_pattern {
        regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            name: "CUSTOM_DOC_NUMBER_PATTERN".to_string(),
            reason: e.to_string(),
        })?;
    }

    Ok(())
}
