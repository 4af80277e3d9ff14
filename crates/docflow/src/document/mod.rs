//! The durable document record and its search projection.

pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use status::{DocumentStatus, Transition};

/// A stored document as the pipeline sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub uploaded_by_id: Option<i64>,
    /// Storage key of the uploaded file, relative to the storage root.
    pub storage_path: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub status: DocumentStatus,
    pub extracted_doc_number: Option<String>,
    pub full_text: Option<String>,
    pub full_text_indexed: bool,
    pub ocr_metadata: Option<OcrMetadata>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Creates a new `Pending` document for an uploaded file.
    pub fn new(id: impl Into<String>, storage_path: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            uploaded_by_id: None,
            storage_path: storage_path.into(),
            title: title.into(),
            description: None,
            category_id: None,
            status: DocumentStatus::Pending,
            extracted_doc_number: None,
            full_text: None,
            full_text_indexed: false,
            ocr_metadata: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    /// Builds the search index projection.
    pub fn to_search_document(&self) -> SearchDocument {
        SearchDocument {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            extracted_doc_number: self.extracted_doc_number.clone(),
            full_text: self.full_text.clone(),
            category_id: self.category_id,
            uploaded_by_id: self.uploaded_by_id,
            status: self.status,
            created_at: self.created_at,
            processed_at: self.processed_at,
        }
    }
}

/// How the text of a document was recognized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrMetadata {
    pub engine: String,
    pub language: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// Confidence fell below the configured threshold.
    #[serde(default)]
    pub low_confidence: bool,
}

/// The subset of a document pushed to the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub extracted_doc_number: Option<String>,
    pub full_text: Option<String>,
    pub category_id: Option<i64>,
    pub uploaded_by_id: Option<i64>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
