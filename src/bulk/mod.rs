//! Bulk import of spreadsheet and document catalogs.
//!
//! Structured files skip the interactive pipeline entirely. They go to
//! an external processing endpoint which extracts rows, dedupes them
//! and writes the results, reporting only aggregate counts back.

use crate::model::{BulkImportStats, RawInput};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BulkImportError {
    #[error("Bulk import is not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Import endpoint error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from import endpoint: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait BulkImporter: Send + Sync {
    async fn import_bulk(&self, input: &RawInput) -> Result<BulkImportStats, BulkImportError>;
}

/// Placeholder used when no bulk endpoint is configured. Lets the
/// pipeline surface a clear error instead of hanging on a missing URL.
pub struct UnconfiguredBulkImporter;

#[async_trait]
impl BulkImporter for UnconfiguredBulkImporter {
    async fn import_bulk(&self, _input: &RawInput) -> Result<BulkImportStats, BulkImportError> {
        Err(BulkImportError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct ImportResponse {
    #[serde(default)]
    created: usize,
    #[serde(default)]
    duplicates: usize,
    #[serde(default)]
    errors: usize,
    #[serde(default)]
    error: Option<String>,
}

/// Sends the raw file to an HTTP processing endpoint as multipart form
/// data and reads the aggregate counts from its JSON reply.
pub struct HttpBulkImporter {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpBulkImporter {
    pub fn new(endpoint: &str, api_token: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token: api_token.map(String::from),
            // Extraction runs rows through an LLM; give it room.
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl BulkImporter for HttpBulkImporter {
    async fn import_bulk(&self, input: &RawInput) -> Result<BulkImportStats, BulkImportError> {
        let part = reqwest::multipart::Part::bytes(input.bytes.clone())
            .file_name(input.original_name.clone())
            .mime_str(&input.content_type)
            .map_err(|e| BulkImportError::Network(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("kind", input.kind.as_str());

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        info!(
            file = %input.original_name,
            kind = input.kind.as_str(),
            "Submitting file for bulk import"
        );
        let response = request
            .send()
            .await
            .map_err(|e| BulkImportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BulkImportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(BulkImportError::Api {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        let parsed: ImportResponse = serde_json::from_str(&body)
            .map_err(|e| BulkImportError::InvalidResponse(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(BulkImportError::InvalidResponse(error));
        }

        let stats = BulkImportStats {
            created: parsed.created,
            duplicates: parsed.duplicates,
            errors: parsed.errors,
        };
        info!(
            created = stats.created,
            duplicates = stats.duplicates,
            errors = stats.errors,
            "Bulk import finished"
        );
        Ok(stats)
    }
}
