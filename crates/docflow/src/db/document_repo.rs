//! Document repository: reads and guarded writes on the `documents` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::document::{Document, DocumentStatus, OcrMetadata};

/// A raw document row from the database.
#[derive(Debug, Clone)]
struct DocumentRow {
    id: String,
    uploaded_by_id: Option<i64>,
    storage_path: String,
    title: String,
    description: Option<String>,
    category_id: Option<i64>,
    status: String,
    extracted_doc_number: Option<String>,
    full_text: Option<String>,
    full_text_indexed: bool,
    ocr_metadata: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
    processed_at: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            uploaded_by_id: row.get("uploaded_by_id")?,
            storage_path: row.get("storage_path")?,
            title: row.get("title")?,
            description: row.get("description")?,
            category_id: row.get("category_id")?,
            status: row.get("status")?,
            extracted_doc_number: row.get("extracted_doc_number")?,
            full_text: row.get("full_text")?,
            full_text_indexed: row.get("full_text_indexed")?,
            ocr_metadata: row.get("ocr_metadata")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            processed_at: row.get("processed_at")?,
        })
    }

    fn into_document(self) -> Result<Document, DatabaseError> {
        let status = self
            .status
            .parse::<DocumentStatus>()
            .map_err(|e| DatabaseError::InvalidColumn {
                column: "status",
                reason: e.to_string(),
            })?;
        let ocr_metadata = match self.ocr_metadata {
            Some(raw) => Some(serde_json::from_str::<OcrMetadata>(&raw).map_err(|e| {
                DatabaseError::InvalidColumn {
                    column: "ocr_metadata",
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Document {
            id: self.id,
            uploaded_by_id: self.uploaded_by_id,
            storage_path: self.storage_path,
            title: self.title,
            description: self.description,
            category_id: self.category_id,
            status,
            extracted_doc_number: self.extracted_doc_number,
            full_text: self.full_text,
            full_text_indexed: self.full_text_indexed,
            ocr_metadata,
            error_message: self.error_message,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            processed_at: self
                .processed_at
                .as_deref()
                .map(|ts| parse_timestamp("processed_at", ts))
                .transpose()?,
        })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidColumn {
            column,
            reason: format!("'{}': {}", value, e),
        })
}

fn encode_metadata(metadata: Option<&OcrMetadata>) -> Result<Option<String>, DatabaseError> {
    metadata
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::InvalidColumn {
            column: "ocr_metadata",
            reason: e.to_string(),
        })
}

/// `status IN (...)` clause for the states `to` may be entered from.
fn source_clause(to: DocumentStatus) -> Option<String> {
    let sources = DocumentStatus::sources_of(to);
    if sources.is_empty() {
        return None;
    }
    let quoted: Vec<String> = sources.iter().map(|s| format!("'{}'", s.as_str())).collect();
    Some(format!("status IN ({})", quoted.join(", ")))
}

/// Inserts a new document row.
pub fn insert(db: &Database, doc: &Document) -> Result<(), DatabaseError> {
    let metadata = encode_metadata(doc.ocr_metadata.as_ref())?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, uploaded_by_id, storage_path, title, description,
             category_id, status, extracted_doc_number, full_text, full_text_indexed,
             ocr_metadata, error_message, created_at, updated_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                doc.id,
                doc.uploaded_by_id,
                doc.storage_path,
                doc.title,
                doc.description,
                doc.category_id,
                doc.status.as_str(),
                doc.extracted_doc_number,
                doc.full_text,
                doc.full_text_indexed,
                metadata,
                doc.error_message,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
                doc.processed_at.map(|ts| ts.to_rfc3339()),
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Document>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id],
                DocumentRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(DocumentRow::into_document).transpose()
}

/// Moves a document to `status` if the current state allows it.
///
/// Returns `false` when the row is missing or the move is not legal from
/// its current status. Entering `Processed` stamps `processed_at`, sets
/// `full_text_indexed` and clears any earlier error.
pub fn update_status(
    db: &Database,
    id: &str,
    status: DocumentStatus,
    error_message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let Some(guard) = source_clause(status) else {
        return Ok(false);
    };
    let processed = status == DocumentStatus::Processed;
    let sql = format!(
        "UPDATE documents SET
             status = ?2,
             error_message = CASE WHEN ?5 THEN NULL ELSE COALESCE(?3, error_message) END,
             updated_at = ?4,
             processed_at = CASE WHEN ?5 THEN ?4 ELSE processed_at END,
             full_text_indexed = CASE WHEN ?5 THEN 1 ELSE full_text_indexed END
         WHERE id = ?1 AND {}",
        guard
    );

    db.with_conn(|conn| {
        let changed = conn.execute(
            &sql,
            params![id, status.as_str(), error_message, now.to_rfc3339(), processed],
        )?;
        Ok(changed == 1)
    })
}

/// Stores OCR output on a document that has not finished yet.
pub fn update_ocr_results(
    db: &Database,
    id: &str,
    full_text: &str,
    extracted_doc_number: Option<&str>,
    metadata: Option<&OcrMetadata>,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let metadata = encode_metadata(metadata)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET full_text = ?2, extracted_doc_number = ?3,
             ocr_metadata = ?4, updated_at = ?5
             WHERE id = ?1 AND status NOT IN ('PROCESSED', 'FAILED')",
            params![id, full_text, extracted_doc_number, metadata, now.to_rfc3339()],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(status: DocumentStatus) -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut doc = Document::new("doc-1", "uploads/invoice.png", "Invoice");
        doc.status = status;
        insert(&db, &doc).unwrap();
        db
    }

    fn status_of(db: &Database) -> DocumentStatus {
        find_by_id(db, "doc-1").unwrap().unwrap().status
    }

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let mut doc = Document::new("doc-9", "uploads/a.png", "A");
        doc.category_id = Some(7);
        doc.uploaded_by_id = Some(11);
        insert(&db, &doc).unwrap();

        let found = find_by_id(&db, "doc-9").unwrap().unwrap();
        assert_eq!(found.id, "doc-9");
        assert_eq!(found.category_id, Some(7));
        assert_eq!(found.uploaded_by_id, Some(11));
        assert_eq!(found.status, DocumentStatus::Pending);
        assert_eq!(found.created_at.timestamp(), doc.created_at.timestamp());
    }

    #[test]
    fn test_find_missing_returns_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(find_by_id(&db, "nope").unwrap().is_none());
    }

    #[test]
    fn test_pending_to_processing() {
        let db = setup(DocumentStatus::Pending);
        assert!(update_status(&db, "doc-1", DocumentStatus::Processing, None, Utc::now()).unwrap());
        assert_eq!(status_of(&db), DocumentStatus::Processing);
    }

    #[test]
    fn test_processed_stamps_timestamp_and_indexed_flag() {
        let db = setup(DocumentStatus::Processing);
        let now = Utc::now();
        assert!(update_status(&db, "doc-1", DocumentStatus::Processed, None, now).unwrap());

        let doc = find_by_id(&db, "doc-1").unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Processed);
        assert!(doc.full_text_indexed);
        assert_eq!(doc.processed_at.map(|t| t.timestamp()), Some(now.timestamp()));
    }

    #[test]
    fn test_failed_records_error() {
        let db = setup(DocumentStatus::Processing);
        assert!(update_status(
            &db,
            "doc-1",
            DocumentStatus::Failed,
            Some("OCR timed out"),
            Utc::now()
        )
        .unwrap());

        let doc = find_by_id(&db, "doc-1").unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error_message.as_deref(), Some("OCR timed out"));
        assert!(doc.processed_at.is_none());
    }

    #[test]
    fn test_terminal_status_is_not_overwritten() {
        let db = setup(DocumentStatus::Processed);
        assert!(!update_status(&db, "doc-1", DocumentStatus::Processing, None, Utc::now()).unwrap());
        assert!(!update_status(&db, "doc-1", DocumentStatus::Failed, Some("x"), Utc::now()).unwrap());
        assert_eq!(status_of(&db), DocumentStatus::Processed);
    }

    #[test]
    fn test_update_missing_document_returns_false() {
        let db = Database::open_in_memory().unwrap();
        assert!(!update_status(&db, "ghost", DocumentStatus::Processing, None, Utc::now()).unwrap());
    }

    #[test]
    fn test_ocr_results_round_trip() {
        let db = setup(DocumentStatus::Processing);
        let metadata = OcrMetadata {
            engine: "tesseract".to_string(),
            language: "eng".to_string(),
            confidence: 0.82,
            timestamp: Utc::now(),
            engine_version: Some("5.3.0".to_string()),
            low_confidence: false,
        };
        assert!(update_ocr_results(
            &db,
            "doc-1",
            "INVOICE INV-000123",
            Some("000123"),
            Some(&metadata),
            Utc::now()
        )
        .unwrap());

        let doc = find_by_id(&db, "doc-1").unwrap().unwrap();
        assert_eq!(doc.full_text.as_deref(), Some("INVOICE INV-000123"));
        assert_eq!(doc.extracted_doc_number.as_deref(), Some("000123"));
        let stored = doc.ocr_metadata.unwrap();
        assert_eq!(stored.engine, "tesseract");
        assert_eq!(stored.engine_version.as_deref(), Some("5.3.0"));
    }

    #[test]
    fn test_ocr_results_ignored_on_terminal_document() {
        let db = setup(DocumentStatus::Failed);
        assert!(!update_ocr_results(&db, "doc-1", "text", None, None, Utc::now()).unwrap());
        assert!(find_by_id(&db, "doc-1").unwrap().unwrap().full_text.is_none());
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "PRAGMA ignore_check_constraints = ON;
                 INSERT INTO documents (id, storage_path, status, created_at, updated_at)
                 VALUES ('bad', 'a.png', 'DONE', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
            )?;
            Ok(())
        })
        .unwrap();

        let err = find_by_id(&db, "bad").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidColumn { column: "status", .. }));
    }
}
