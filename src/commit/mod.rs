//! The write boundary between drafts and the catalog.
//!
//! Validation that must hold for any record, regardless of how the
//! draft was produced, lives here rather than in the pipeline.

use crate::catalog::{CatalogStore, CatalogWriteError, ProductRecord};
use crate::model::{DraftStatus, ImportSource, ProductDraft, RecordId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Price above which a commit is logged for review. Advisory only, the
/// write still goes through.
const PRICE_SANITY_CEILING: f64 = 1_000_000.0;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("A product title is required")]
    EmptyTitle,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<CatalogWriteError> for CommitError {
    fn from(e: CatalogWriteError) -> Self {
        match e {
            CatalogWriteError::Conflict(msg) => CommitError::Conflict(msg),
            CatalogWriteError::ValidationFailed(msg) => CommitError::ValidationFailed(msg),
            CatalogWriteError::Io(err) => CommitError::Store(err.to_string()),
        }
    }
}

/// Per-item outcome of a batch commit. Successes stand even when
/// siblings fail.
#[derive(Debug, Default)]
pub struct BatchCommitOutcome {
    pub succeeded: Vec<RecordId>,
    pub failed: Vec<(usize, CommitError)>,
}

impl BatchCommitOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Committer {
    store: Arc<dyn CatalogStore>,
    business_id: String,
}

impl Committer {
    pub fn new(store: Arc<dyn CatalogStore>, business_id: &str) -> Self {
        Self {
            store,
            business_id: business_id.to_string(),
        }
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    /// Write one draft as a record with the given status.
    ///
    /// The title guard runs before the store is touched, so a rejected
    /// draft leaves no partial write behind.
    pub fn commit(
        &self,
        draft: &ProductDraft,
        status: DraftStatus,
    ) -> Result<RecordId, CommitError> {
        if !draft.has_title() {
            return Err(CommitError::EmptyTitle);
        }
        if let Some(price) = draft.price {
            if price > PRICE_SANITY_CEILING {
                warn!(price, title = %draft.title, "Price above sanity ceiling");
            }
        }

        let record = ProductRecord::from_draft(draft, &self.business_id, status, draft.import_source);
        let id = self.store.insert(&record)?;
        info!(
            record_id = %id,
            status = status.as_str(),
            source = draft.import_source.as_str(),
            "Committed product"
        );
        Ok(id)
    }

    /// Write a set of drafts as one store batch. One failure never rolls
    /// back or blocks its siblings.
    pub fn commit_many(
        &self,
        drafts: &[ProductDraft],
        status: DraftStatus,
    ) -> BatchCommitOutcome {
        let mut outcome = BatchCommitOutcome::default();
        let mut records = Vec::with_capacity(drafts.len());
        let mut indices = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.iter().enumerate() {
            if !draft.has_title() {
                warn!(index, "Draft in batch has no title");
                outcome.failed.push((index, CommitError::EmptyTitle));
                continue;
            }
            if let Some(price) = draft.price {
                if price > PRICE_SANITY_CEILING {
                    warn!(price, title = %draft.title, "Price above sanity ceiling");
                }
            }
            records.push(ProductRecord::from_draft(
                draft,
                &self.business_id,
                status,
                draft.import_source,
            ));
            indices.push(index);
        }

        for (index, result) in indices.into_iter().zip(self.store.insert_many(&records)) {
            match result {
                Ok(id) => {
                    info!(record_id = %id, status = status.as_str(), "Committed product");
                    outcome.succeeded.push(id);
                }
                Err(e) => {
                    let e = CommitError::from(e);
                    warn!(index, error = %e, "Draft in batch failed to commit");
                    outcome.failed.push((index, e));
                }
            }
        }
        outcome.failed.sort_by_key(|(index, _)| *index);
        outcome
    }
}
