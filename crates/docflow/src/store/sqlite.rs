use async_trait::async_trait;
use chrono::Utc;

use super::DocumentStore;
use crate::db::{document_repo, Database, DatabaseError};
use crate::document::{Document, DocumentStatus, OcrMetadata};
use crate::error::StoreError;

/// [`DocumentStore`] over the local SQLite database. Each call runs on the
/// blocking pool so the worker's runtime threads never wait on the
/// connection lock.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Database,
}

impl SqliteDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Inserts a new document, as the upload side does.
    pub async fn insert(&self, doc: Document) -> Result<(), StoreError> {
        let id = doc.id.clone();
        self.run(id, move |db| document_repo::insert(db, &doc)).await
    }

    async fn run<F, T>(&self, id: String, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?;

        result.map_err(|e| match e {
            DatabaseError::InvalidColumn { column, reason } => StoreError::Corrupt {
                id,
                reason: format!("{}: {}", column, reason),
            },
            other => StoreError::Database(other),
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let key = id.to_string();
        self.run(id.to_string(), move |db| document_repo::find_by_id(db, &key))
            .await
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let key = id.to_string();
        let error_message = error_message.map(str::to_string);
        self.run(id.to_string(), move |db| {
            document_repo::update_status(db, &key, status, error_message.as_deref(), Utc::now())
        })
        .await
    }

    async fn update_with_ocr_results(
        &self,
        id: &str,
        full_text: &str,
        extracted_doc_number: Option<&str>,
        ocr_metadata: Option<&OcrMetadata>,
    ) -> Result<bool, StoreError> {
        let key = id.to_string();
        let full_text = full_text.to_string();
        let number = extracted_doc_number.map(str::to_string);
        let metadata = ocr_metadata.cloned();
        self.run(id.to_string(), move |db| {
            document_repo::update_ocr_results(
                db,
                &key,
                &full_text,
                number.as_deref(),
                metadata.as_ref(),
                Utc::now(),
            )
        })
        .await
    }
}
