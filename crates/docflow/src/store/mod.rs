//! Collaborators that own documents and their uploaded files.

pub mod files;
pub mod sqlite;

use async_trait::async_trait;

pub use files::LocalFileSource;
pub use sqlite::SqliteDocumentStore;

use crate::document::{Document, DocumentStatus, OcrMetadata};
use crate::error::{FileError, StoreError};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Applies a status change if it is legal from the stored status.
    /// Returns whether the row changed.
    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Persists OCR output on a document that is not yet terminal.
    async fn update_with_ocr_results(
        &self,
        id: &str,
        full_text: &str,
        extracted_doc_number: Option<&str>,
        ocr_metadata: Option<&OcrMetadata>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait FileSource: Send + Sync {
    /// Reads the uploaded file behind a document's storage path.
    async fn fetch(&self, storage_path: &str) -> Result<Vec<u8>, FileError>;
}
