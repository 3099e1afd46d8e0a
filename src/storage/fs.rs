//! Filesystem storage broker, used by the CLI and local deployments.

use super::{object_name, StorageBroker, StorageError};
use crate::model::UploadedAsset;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct FsStorageBroker {
    media_dir: PathBuf,
    max_file_size: u64,
}

impl FsStorageBroker {
    pub fn new(media_dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            media_dir: media_dir.into(),
            max_file_size,
        }
    }

    /// Create the media directory if it does not exist yet.
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.media_dir).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBroker for FsStorageBroker {
    async fn upload(
        &self,
        bytes: &[u8],
        _content_type: &str,
        name_hint: &str,
    ) -> Result<UploadedAsset, StorageError> {
        if bytes.len() as u64 > self.max_file_size {
            // The filesystem analogue of running out of quota.
            return Err(StorageError::QuotaExceeded);
        }

        let name = object_name(name_hint);
        let path = self.media_dir.join(&name);

        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        debug!(path = %path.display(), size = bytes.len(), "Stored asset on disk");

        Ok(UploadedAsset::image(format!(
            "file://{}",
            path.to_string_lossy()
        )))
    }
}
