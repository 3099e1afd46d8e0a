use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub business_id: Option<String>,
    pub media_dir: Option<String>,
    pub logging_level: Option<String>,

    // Feature configs
    pub ai: Option<AiConfig>,
    pub image_engine: Option<ImageEngineConfig>,
    pub storage: Option<StorageConfig>,
    pub dedup: Option<DedupConfig>,
    pub bulk: Option<BulkConfig>,
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AiConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Shell command that prints the API key, as an alternative to
    /// embedding it in the file.
    pub api_key_command: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImageEngineConfig {
    /// Predictions-style API base URL.
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Object storage base URL; when absent, uploads land on the local
    /// filesystem under `media_dir`.
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub api_token: Option<String>,
    pub max_file_size_mb: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DedupConfig {
    pub similarity_floor: Option<f32>,
    pub max_candidates: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BulkConfig {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_batch_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
