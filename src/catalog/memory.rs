//! In-memory catalog store for tests and ephemeral runs.

use super::{CandidateRecord, CatalogStore, CatalogWriteError, ProductRecord};
use crate::model::RecordId;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryCatalogStore {
    records: Mutex<Vec<ProductRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail with a store error. For
    /// exercising commit failure handling.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ProductRecord> {
        self.records.lock().unwrap().clone()
    }

    fn to_candidate(record: &ProductRecord) -> CandidateRecord {
        CandidateRecord {
            id: record.id.clone(),
            title: record.title.clone(),
            price: record.price,
            sku: record.sku.clone(),
            brand: record.brand.clone(),
        }
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn find_by_title_like(
        &self,
        prefix: &str,
        scope: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.business_id == scope && r.normalized_title.starts_with(prefix))
            .take(limit)
            .map(Self::to_candidate)
            .collect())
    }

    fn find_by_sku(&self, sku: &str, scope: &str) -> Result<Option<CandidateRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|r| r.business_id == scope && r.sku.as_deref() == Some(sku))
            .map(Self::to_candidate))
    }

    fn insert(&self, record: &ProductRecord) -> Result<RecordId, CatalogWriteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CatalogWriteError::Io(anyhow::anyhow!(
                "simulated write failure"
            )));
        }
        if record.title.trim().is_empty() {
            return Err(CatalogWriteError::ValidationFailed(
                "title must not be empty".to_string(),
            ));
        }

        let mut records = self.records.lock().unwrap();
        if let Some(sku) = record.sku.as_deref() {
            let taken = records
                .iter()
                .any(|r| r.business_id == record.business_id && r.sku.as_deref() == Some(sku));
            if taken {
                return Err(CatalogWriteError::Conflict(format!(
                    "sku {} already exists",
                    sku
                )));
            }
        }
        records.push(record.clone());
        Ok(record.id.clone())
    }

    fn count(&self, scope: &str) -> Result<usize> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| r.business_id == scope).count())
    }
}
