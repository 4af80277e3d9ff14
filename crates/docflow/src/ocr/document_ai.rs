//! Google Document AI processor client.
//!
//! Accepts PDFs as well as images, which makes it the engine of choice for
//! multi-page scans.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{http_failure, DocumentFormat, OcrBackend, OcrError, OcrInput, OcrOutput};
use crate::config::DocumentAiSettings;
use crate::sanitize;

const ENGINE: &str = "document_ai";

pub struct DocumentAiBackend {
    client: reqwest::Client,
    /// `projects/P/locations/L/processors/ID`
    processor_name: String,
    base_url: String,
    access_token: SecretString,
}

impl DocumentAiBackend {
    pub fn new(client: reqwest::Client, settings: &DocumentAiSettings) -> Self {
        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| regional_base_url(&settings.processor_name));
        Self {
            client,
            processor_name: settings.processor_name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: SecretString::from(settings.access_token.expose_secret().to_string()),
        }
    }

    fn process_url(&self) -> String {
        format!("{}/v1/{}:process", self.base_url, self.processor_name)
    }
}

/// `https://{location}-documentai.googleapis.com`, location taken from the
/// processor resource name.
fn regional_base_url(processor_name: &str) -> String {
    let location = processor_name.split('/').nth(3).unwrap_or("us");
    format!("https://{}-documentai.googleapis.com", location)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
    skip_human_review: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: Option<ProcessedDocument>,
}

#[derive(Deserialize)]
struct ProcessedDocument {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl OcrBackend for DocumentAiBackend {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn supports(&self, _format: DocumentFormat) -> bool {
        true
    }

    async fn recognize(&self, input: OcrInput<'_>) -> Result<OcrOutput, OcrError> {
        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(input.bytes),
                mime_type: input.format.mime_type(),
            },
            skip_human_review: true,
        };

        tracing::debug!(
            processor = %self.processor_name,
            mime_type = %request.raw_document.mime_type,
            "Sending document to Document AI"
        );

        let response = self
            .client
            .post(self.process_url())
            .bearer_auth(self.access_token.expose_secret())
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

        let parsed: ProcessResponse = response.json().await.map_err(|e| OcrError::Engine {
            engine: ENGINE,
            message: format!("invalid response: {}", e),
        })?;

        Ok(OcrOutput {
            text: parsed.document.map(|d| d.text).unwrap_or_default(),
            engine: ENGINE,
            engine_version: Some("v1".to_string()),
        })
    }
}
