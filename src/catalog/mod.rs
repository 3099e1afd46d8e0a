//! Catalog store: the persistent home of committed product records.
//!
//! The trait abstracts the reads used by duplicate resolution and the
//! writes used by the committer, so the pipeline can run against SQLite
//! or the in-memory store interchangeably.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryCatalogStore;
pub use schema::{CATALOG_SCHEMA_SQL, CATALOG_SCHEMA_VERSION};
pub use sqlite::SqliteCatalogStore;

use crate::dedup::normalize_title;
use crate::model::{DraftStatus, ImportSource, ProductDraft, RecordId};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Write failures at the catalog boundary.
#[derive(Debug, Error)]
pub enum CatalogWriteError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Store error: {0}")]
    Io(#[from] anyhow::Error),
}

/// Read model returned to duplicate resolution.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub id: RecordId,
    pub title: String,
    pub price: Option<f64>,
    pub sku: Option<String>,
    pub brand: Option<String>,
}

/// A fully-resolved record ready to be written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: RecordId,
    pub business_id: String,
    pub title: String,
    pub normalized_title: String,
    pub description: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub unit: String,
    pub stock: Option<u32>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub attributes: std::collections::BTreeMap<String, String>,
    pub status: DraftStatus,
    pub import_source: ImportSource,
    pub ai_confidence: Option<f32>,
    pub created_at: i64,
}

impl ProductRecord {
    /// Materialize a draft into a record for one business scope.
    pub fn from_draft(
        draft: &ProductDraft,
        business_id: &str,
        status: DraftStatus,
        import_source: ImportSource,
    ) -> Self {
        let title = draft.title.trim().to_string();
        Self {
            id: RecordId::generate(),
            business_id: business_id.to_string(),
            normalized_title: normalize_title(&title),
            title,
            description: draft.description.trim().to_string(),
            price: draft.price,
            currency: draft.currency.clone(),
            category: draft.category.trim().to_string(),
            brand: draft.brand.clone().filter(|b| !b.trim().is_empty()),
            sku: draft.sku.clone().filter(|s| !s.trim().is_empty()),
            unit: draft.unit.clone(),
            stock: draft.stock,
            tags: draft.tags.clone(),
            image_url: draft.image_url.clone(),
            attributes: draft.attributes.clone(),
            status,
            import_source,
            ai_confidence: draft.ai_confidence,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Storage backend for committed catalog records.
pub trait CatalogStore: Send + Sync {
    /// Prefix search on the normalized title, scoped to one business.
    fn find_by_title_like(
        &self,
        prefix: &str,
        scope: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>>;

    /// Exact SKU lookup, scoped to one business.
    fn find_by_sku(&self, sku: &str, scope: &str) -> Result<Option<CandidateRecord>>;

    /// Insert a single record.
    fn insert(&self, record: &ProductRecord) -> Result<RecordId, CatalogWriteError>;

    /// Insert a batch, reporting the outcome per item. No rollback:
    /// records written before a failure stand.
    fn insert_many(&self, records: &[ProductRecord]) -> Vec<Result<RecordId, CatalogWriteError>> {
        records.iter().map(|r| self.insert(r)).collect()
    }

    /// Number of records in one business scope.
    fn count(&self, scope: &str) -> Result<usize>;
}
