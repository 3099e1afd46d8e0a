//! HTTP object-storage broker.
//!
//! Speaks the flat REST dialect common to hosted object stores: a POST to
//! `{base}/object/{bucket}/{name}` with a bearer token, with the public
//! URL derived as `{base}/object/public/{bucket}/{name}`.

use super::{object_name, StorageBroker, StorageError};
use crate::model::UploadedAsset;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpStorageBroker {
    client: Client,
    base_url: String,
    bucket: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpStorageBroker {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            bucket: bucket.into(),
            api_token,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl StorageBroker for HttpStorageBroker {
    async fn upload(
        &self,
        bytes: &[u8],
        content_type: &str,
        name_hint: &str,
    ) -> Result<UploadedAsset, StorageError> {
        let name = object_name(name_hint);
        let url = format!("{}/object/{}/{}", self.base_url, self.bucket, name);

        debug!(bucket = %self.bucket, object = %name, size = bytes.len(), "Uploading asset");

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .timeout(self.timeout);

        if let Some(token) = &self.api_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let response = req
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 413 || status.as_u16() == 507 {
            warn!(bucket = %self.bucket, "Storage quota exceeded");
            return Err(StorageError::QuotaExceeded);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let public_url = format!(
            "{}/object/public/{}/{}",
            self.base_url, self.bucket, name
        );
        Ok(UploadedAsset::image(public_url))
    }
}
