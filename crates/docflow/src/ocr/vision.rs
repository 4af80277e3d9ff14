//! Google Cloud Vision `images:annotate` client.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{http_failure, DocumentFormat, OcrBackend, OcrError, OcrInput, OcrOutput};
use crate::config::GoogleVisionSettings;
use crate::sanitize;

const ENGINE: &str = "google_vision";
const API_VERSION: &str = "v1";

pub struct GoogleVisionBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl GoogleVisionBackend {
    pub fn new(client: reqwest::Client, settings: &GoogleVisionSettings) -> Self {
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: SecretString::from(settings.api_key.expose_secret().to_string()),
        }
    }
}

/// Maps tesseract language codes to the BCP-47 hints Vision expects.
pub(crate) fn language_hints(language: &str) -> Vec<String> {
    language
        .split([',', '+'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|code| {
            match code {
                "eng" => "en",
                "deu" | "ger" => "de",
                "fra" | "fre" => "fr",
                "spa" => "es",
                "ita" => "it",
                "ind" => "id",
                "nld" | "dut" => "nl",
                "por" => "pt",
                other => other,
            }
            .to_string()
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    image_context: ImageContext,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<String>,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// `google.rpc.Code.INVALID_ARGUMENT`
const RPC_INVALID_ARGUMENT: i32 = 3;

#[async_trait]
impl OcrBackend for GoogleVisionBackend {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        format.is_image()
    }

    async fn recognize(&self, input: OcrInput<'_>) -> Result<OcrOutput, OcrError> {
        let request = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: BASE64.encode(input.bytes),
                },
                features: vec![Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                image_context: ImageContext {
                    language_hints: language_hints(input.language),
                },
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::Engine {
                engine: ENGINE,
                message: sanitize::diagnostic(&e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_failure(ENGINE, status.as_u16(), &body));
        }

        let parsed: AnnotateResponse = response.json().await.map_err(|e| OcrError::Engine {
            engine: ENGINE,
            message: format!("invalid response: {}", e),
        })?;

        let first = parsed.responses.into_iter().next();
        if let Some(Status { code, message }) = first.as_ref().and_then(|r| r.error.as_ref()) {
            let message = sanitize::diagnostic(message);
            return Err(if *code == RPC_INVALID_ARGUMENT {
                OcrError::Rejected {
                    engine: ENGINE,
                    status: 400,
                    message,
                }
            } else {
                OcrError::Engine {
                    engine: ENGINE,
                    message,
                }
            });
        }

        // A blank image comes back without an annotation.
        let text = first
            .and_then(|r| r.full_text_annotation)
            .map(|a| a.text)
            .unwrap_or_default();

        Ok(OcrOutput {
            text,
            engine: ENGINE,
            engine_version: Some(API_VERSION.to_string()),
        })
    }
}
