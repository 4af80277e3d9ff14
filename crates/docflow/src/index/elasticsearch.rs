//! Elasticsearch document index over its REST API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use super::SearchIndexer;
use crate::config::ElasticsearchSettings;
use crate::document::SearchDocument;
use crate::error::{ConfigError, IndexError};
use crate::sanitize;

enum Auth {
    None,
    Basic {
        username: String,
        password: Option<SecretString>,
    },
    ApiKey(SecretString),
}

pub struct ElasticsearchIndexer {
    client: reqwest::Client,
    base: Url,
    index: String,
    auth: Auth,
    shards: u32,
    replicas: u32,
}

impl ElasticsearchIndexer {
    pub fn new(settings: &ElasticsearchSettings) -> Result<Self, ConfigError> {
        let base = Url::parse(&settings.url).map_err(|e| ConfigError::InvalidValue {
            key: "ELASTICSEARCH_HOST".to_string(),
            value: settings.url.clone(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let auth = match (&settings.api_key, &settings.username) {
            (Some(key), _) => Auth::ApiKey(SecretString::from(key.expose_secret().to_string())),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: settings
                    .password
                    .as_ref()
                    .map(|p| SecretString::from(p.expose_secret().to_string())),
            },
            (None, None) => Auth::None,
        };

        Ok(Self {
            client,
            base,
            index: settings.index.clone(),
            auth,
            shards: settings.shards,
            replicas: settings.replicas,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn url(&self, segments: &[&str]) -> Result<Url, IndexError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Request(format!("cannot use '{}' as a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => {
                builder.basic_auth(username, password.as_ref().map(|p| p.expose_secret().to_string()))
            }
            Auth::ApiKey(key) => {
                builder.header("Authorization", format!("ApiKey {}", key.expose_secret()))
            }
        }
    }

    /// Index settings and field mappings for the documents index.
    pub fn index_definition(&self) -> Value {
        let date = json!({
            "type": "date",
            "format": "strict_date_optional_time||yyyy-MM-dd HH:mm:ss||yyyy-MM-dd||epoch_millis"
        });
        json!({
            "settings": {
                "number_of_shards": self.shards,
                "number_of_replicas": self.replicas
            },
            "mappings": {
                "properties": {
                    "id": {"type": "keyword"},
                    "title": {
                        "type": "text",
                        "analyzer": "standard",
                        "fields": {"keyword": {"type": "keyword", "ignore_above": 256}}
                    },
                    "description": {"type": "text", "analyzer": "standard"},
                    "extracted_doc_number": {
                        "type": "text",
                        "analyzer": "keyword",
                        "fields": {"keyword": {"type": "keyword", "ignore_above": 256}}
                    },
                    "full_text": {"type": "text", "analyzer": "standard"},
                    "category_id": {"type": "integer"},
                    "uploaded_by_id": {"type": "integer"},
                    "status": {"type": "keyword"},
                    "created_at": date.clone(),
                    "processed_at": date
                }
            }
        })
    }

    /// Creates the index with its mapping unless it already exists.
    /// Returns `true` when the index was created.
    pub async fn ensure_index(&self) -> Result<bool, IndexError> {
        let url = self.url(&[&self.index])?;
        let head = self.request(Method::HEAD, url.clone()).send().await?;
        match head.status() {
            StatusCode::OK => return Ok(false),
            StatusCode::NOT_FOUND => {}
            other => {
                return Err(IndexError::Rejected {
                    status: other.as_u16(),
                    body: String::new(),
                })
            }
        }

        let response = self
            .request(Method::PUT, url)
            .json(&self.index_definition())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!(index = %self.index, "Created search index");
            return Ok(true);
        }

        let body = response.text().await.unwrap_or_default();
        // Another worker created it between HEAD and PUT.
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            return Ok(false);
        }
        Err(IndexError::Rejected {
            status: status.as_u16(),
            body: sanitize::diagnostic(&body),
        })
    }
}

#[async_trait]
impl SearchIndexer for ElasticsearchIndexer {
    async fn index(&self, doc: &SearchDocument) -> Result<(), IndexError> {
        let url = self.url(&[&self.index, "_doc", &doc.id])?;
        let response = self.request(Method::PUT, url).json(doc).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Rejected {
                status: status.as_u16(),
                body: sanitize::diagnostic(&body),
            });
        }
        tracing::debug!(index = %self.index, document_id = %doc.id, "Indexed document");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), IndexError> {
        let url = self.url(&[&self.index, "_doc", id])?;
        let response = self.request(Method::DELETE, url).send().await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(IndexError::Rejected {
            status: status.as_u16(),
            body: sanitize::diagnostic(&body),
        })
    }
}
