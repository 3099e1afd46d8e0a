//! In-memory storage broker for tests and offline runs.

use super::{object_name, StorageBroker, StorageError};
use crate::model::UploadedAsset;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keeps uploaded bytes in a map keyed by the generated URL. Can be
/// configured to fail to exercise error paths.
#[derive(Default)]
pub struct MemoryStorageBroker {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_with: Mutex<Option<StorageErrorKind>>,
}

#[derive(Debug, Clone, Copy)]
pub enum StorageErrorKind {
    Network,
    QuotaExceeded,
}

impl MemoryStorageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next uploads fail with the given error kind.
    pub fn fail_with(&self, kind: StorageErrorKind) {
        *self.fail_with.lock().unwrap() = Some(kind);
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock().unwrap() = None;
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.objects.lock().unwrap().contains_key(url)
    }
}

#[async_trait]
impl StorageBroker for MemoryStorageBroker {
    async fn upload(
        &self,
        bytes: &[u8],
        _content_type: &str,
        name_hint: &str,
    ) -> Result<UploadedAsset, StorageError> {
        if let Some(kind) = *self.fail_with.lock().unwrap() {
            return Err(match kind {
                StorageErrorKind::Network => {
                    StorageError::Network("simulated network failure".to_string())
                }
                StorageErrorKind::QuotaExceeded => StorageError::QuotaExceeded,
            });
        }

        let url = format!("mem://assets/{}", object_name(name_hint));
        self.objects
            .lock()
            .unwrap()
            .insert(url.clone(), bytes.to_vec());
        Ok(UploadedAsset::image(url))
    }
}
