pub mod elasticsearch;

use async_trait::async_trait;

pub use elasticsearch::ElasticsearchIndexer;

use crate::document::SearchDocument;
use crate::error::IndexError;

/// Makes processed documents searchable.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Creates or replaces the entry for `doc.id`.
    async fn index(&self, doc: &SearchDocument) -> Result<(), IndexError>;

    /// Deletes the entry for `id`; a missing entry is not an error.
    async fn remove(&self, id: &str) -> Result<(), IndexError>;
}
