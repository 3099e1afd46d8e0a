//! Storage Broker: persists a raw file, returns a stable addressable
//! reference. No business logic lives here.

mod fs;
mod http;
mod memory;

pub use fs::FsStorageBroker;
pub use http::HttpStorageBroker;
pub use memory::{MemoryStorageBroker, StorageErrorKind};

use crate::model::UploadedAsset;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uploads raw bytes and returns a stable reference to the stored object.
#[async_trait]
pub trait StorageBroker: Send + Sync {
    async fn upload(
        &self,
        bytes: &[u8],
        content_type: &str,
        name_hint: &str,
    ) -> Result<UploadedAsset, StorageError>;
}

/// Derive a safe object name: uuid plus the original extension when one
/// is present.
pub(crate) fn object_name(name_hint: &str) -> String {
    let ext = name_hint
        .rsplit('.')
        .next()
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("jpg");
    format!("{}.{}", uuid::Uuid::new_v4(), ext.to_lowercase())
}
