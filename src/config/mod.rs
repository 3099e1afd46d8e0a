mod file_config;

pub use file_config::{
    AiConfig, BulkConfig, DedupConfig, FileConfig, ImageEngineConfig, PipelineConfig,
    StorageConfig,
};

use crate::dedup::{DEFAULT_MAX_CANDIDATES, DEFAULT_SIMILARITY_FLOOR};
use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub business_id: Option<String>,
    pub media_dir: Option<PathBuf>,
    pub ai_endpoint: Option<String>,
    pub ai_model: Option<String>,
    pub engine_endpoint: Option<String>,
    pub storage_endpoint: Option<String>,
    pub bulk_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub business_id: String,
    pub media_dir: PathBuf,
    /// Default log level; the `LOG_LEVEL` env var still wins.
    pub logging_level: LevelFilter,

    pub ai: AiSettings,
    pub image_engine: ImageEngineSettings,
    pub storage: StorageSettings,
    pub dedup: DedupSettings,
    pub bulk: BulkSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct AiSettings {
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct ImageEngineSettings {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// When set, uploads go to this object storage endpoint; otherwise
    /// the local filesystem broker is used.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub api_token: Option<String>,
    pub max_file_size: u64,
}

#[derive(Debug, Clone)]
pub struct DedupSettings {
    pub similarity_floor: f32,
    pub max_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_batch_size: usize,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let business_id = file
            .business_id
            .or_else(|| cli.business_id.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "business_id must be specified via --business-id or in config file"
                )
            })?;
        if business_id.trim().is_empty() {
            bail!("business_id must not be empty");
        }

        let media_dir = file
            .media_dir
            .map(PathBuf::from)
            .or_else(|| cli.media_dir.clone())
            .unwrap_or_else(|| PathBuf::from("media"));

        let logging_level = match &file.logging_level {
            Some(level) => level
                .parse()
                .map_err(|_| anyhow::anyhow!("Unrecognized logging_level: {}", level))?,
            None => LevelFilter::INFO,
        };

        let ai_file = file.ai.unwrap_or_default();
        let ai = AiSettings {
            endpoint: ai_file.endpoint.or_else(|| cli.ai_endpoint.clone()),
            model: ai_file
                .model
                .or_else(|| cli.ai_model.clone())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key: ai_file.api_key,
            api_key_command: ai_file.api_key_command,
            timeout_sec: ai_file.timeout_sec.unwrap_or(60),
        };

        let engine_file = file.image_engine.unwrap_or_default();
        let image_engine = ImageEngineSettings {
            endpoint: engine_file.endpoint.or_else(|| cli.engine_endpoint.clone()),
            api_token: engine_file.api_token,
            poll_interval_ms: engine_file.poll_interval_ms.unwrap_or(2000),
            max_polls: engine_file.max_polls.unwrap_or(60),
        };

        let storage_file = file.storage.unwrap_or_default();
        let storage = StorageSettings {
            endpoint: storage_file
                .endpoint
                .or_else(|| cli.storage_endpoint.clone()),
            bucket: storage_file
                .bucket
                .unwrap_or_else(|| "product-images".to_string()),
            api_token: storage_file.api_token,
            max_file_size: storage_file.max_file_size_mb.unwrap_or(10) * 1024 * 1024,
        };

        let dedup_file = file.dedup.unwrap_or_default();
        let similarity_floor = dedup_file
            .similarity_floor
            .unwrap_or(DEFAULT_SIMILARITY_FLOOR);
        if !(0.0..=1.0).contains(&similarity_floor) {
            bail!(
                "dedup.similarity_floor must be within [0, 1], got {}",
                similarity_floor
            );
        }
        let dedup = DedupSettings {
            similarity_floor,
            max_candidates: dedup_file.max_candidates.unwrap_or(DEFAULT_MAX_CANDIDATES),
        };

        let bulk_file = file.bulk.unwrap_or_default();
        let bulk = BulkSettings {
            endpoint: bulk_file.endpoint.or_else(|| cli.bulk_endpoint.clone()),
            api_token: bulk_file.api_token,
            timeout_sec: bulk_file.timeout_sec.unwrap_or(300),
        };

        let pipeline_file = file.pipeline.unwrap_or_default();
        let max_batch_size = pipeline_file.max_batch_size.unwrap_or(10);
        if max_batch_size == 0 {
            bail!("pipeline.max_batch_size must be at least 1");
        }
        let pipeline = PipelineSettings { max_batch_size };

        Ok(Self {
            db_path,
            business_id,
            media_dir,
            logging_level,
            ai,
            image_engine,
            storage,
            dedup,
            bulk,
            pipeline,
        })
    }
}
