use anyhow::{bail, Context, Result};
use catalog_ingest::ai::{
    ExtractionClient, ImageEngine, NoOpImageEngine, NoOpVisionProvider, OpenAiVisionProvider,
    ReplicateImageEngine, VisionProvider,
};
use catalog_ingest::bulk::{BulkImporter, HttpBulkImporter, UnconfiguredBulkImporter};
use catalog_ingest::catalog::SqliteCatalogStore;
use catalog_ingest::classify;
use catalog_ingest::commit::Committer;
use catalog_ingest::config::{AppConfig, CliConfig, FileConfig};
use catalog_ingest::dedup::DuplicateResolver;
use catalog_ingest::enhance::EnhancementCoordinator;
use catalog_ingest::model::{DraftStatus, RawInput};
use catalog_ingest::pipeline::{
    IngestError, IngestionPipeline, PipelineState, SaveOutcome, StartOutcome,
};
use catalog_ingest::storage::{FsStorageBroker, HttpStorageBroker, StorageBroker};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// What to do when the duplicate gate parks a save.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnDuplicate {
    /// Leave the item unwritten and report the candidates.
    Skip,
    /// Commit despite the warning.
    Save,
}

#[derive(Parser, Debug)]
#[clap(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Files to ingest: product photos, or a single spreadsheet or PDF.
    #[clap(required = true, value_parser = parse_path)]
    pub files: Vec<PathBuf>,

    /// Path to a TOML config file. Its values override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite catalog database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Scope records are written under.
    #[clap(long)]
    pub business_id: Option<String>,

    /// Directory for stored images when no object storage is configured.
    #[clap(long, value_parser = parse_path)]
    pub media_dir: Option<PathBuf>,

    /// OpenAI-compatible chat completions endpoint for extraction.
    #[clap(long)]
    pub ai_endpoint: Option<String>,

    /// Vision model name.
    #[clap(long)]
    pub ai_model: Option<String>,

    /// Predictions-style API base URL for image enhancement.
    #[clap(long)]
    pub engine_endpoint: Option<String>,

    /// Object storage base URL for uploads.
    #[clap(long)]
    pub storage_endpoint: Option<String>,

    /// Endpoint handling spreadsheet and PDF bulk imports.
    #[clap(long)]
    pub bulk_endpoint: Option<String>,

    /// Commit as published instead of unpublished draft.
    #[clap(long)]
    pub publish: bool,

    #[clap(long, value_enum, default_value_t = OnDuplicate::Skip)]
    pub on_duplicate: OnDuplicate,
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<RawInput>> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read input file: {:?}", path))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let input = classify::classify(bytes, &name, content_type_for(&name))
            .with_context(|| format!("Unsupported input file: {:?}", path))?;
        inputs.push(input);
    }
    Ok(inputs)
}

fn build_vision(config: &AppConfig) -> Arc<dyn VisionProvider> {
    let settings = &config.ai;
    let Some(endpoint) = &settings.endpoint else {
        warn!("No vision endpoint configured; AI extraction disabled");
        return Arc::new(NoOpVisionProvider);
    };
    let provider = match &settings.api_key_command {
        Some(command) => {
            OpenAiVisionProvider::with_key_command(endpoint, &settings.model, command.clone())
        }
        None => OpenAiVisionProvider::new(endpoint, &settings.model, settings.api_key.clone()),
    };
    Arc::new(provider.with_timeout(Duration::from_secs(settings.timeout_sec)))
}

fn build_engine(config: &AppConfig) -> Arc<dyn ImageEngine> {
    let settings = &config.image_engine;
    let Some(endpoint) = &settings.endpoint else {
        warn!("No image engine configured; enhancement disabled");
        return Arc::new(NoOpImageEngine);
    };
    let engine = ReplicateImageEngine::new(endpoint, settings.api_token.clone().unwrap_or_default())
        .with_polling(
            Duration::from_millis(settings.poll_interval_ms),
            settings.max_polls as usize,
        );
    Arc::new(engine)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        business_id: cli_args.business_id.clone(),
        media_dir: cli_args.media_dir.clone(),
        ai_endpoint: cli_args.ai_endpoint.clone(),
        ai_model: cli_args.ai_model.clone(),
        engine_endpoint: cli_args.engine_endpoint.clone(),
        storage_endpoint: cli_args.storage_endpoint.clone(),
        bulk_endpoint: cli_args.bulk_endpoint.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(config.logging_level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    info!(
        "catalog-ingest {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let inputs = read_inputs(&cli_args.files)?;
    if inputs.len() > config.pipeline.max_batch_size {
        bail!(
            "Too many files: {} supplied, the batch limit is {}",
            inputs.len(),
            config.pipeline.max_batch_size
        );
    }

    info!("Opening SQLite catalog database at {:?}...", config.db_path);
    let store = Arc::new(SqliteCatalogStore::open(&config.db_path)?);

    let storage: Arc<dyn StorageBroker> = match &config.storage.endpoint {
        Some(endpoint) => Arc::new(HttpStorageBroker::new(
            endpoint,
            &config.storage.bucket,
            config.storage.api_token.clone(),
        )),
        None => {
            let broker =
                FsStorageBroker::new(&config.media_dir, config.storage.max_file_size);
            broker.init().await?;
            Arc::new(broker)
        }
    };

    let engine = build_engine(&config);
    let extractor = Arc::new(ExtractionClient::new(build_vision(&config), engine.clone()));
    let resolver = DuplicateResolver::new(store.clone()).with_policy(
        config.dedup.similarity_floor,
        config.dedup.max_candidates,
    );
    let committer = Committer::new(store, &config.business_id);
    let bulk: Arc<dyn BulkImporter> = match &config.bulk.endpoint {
        Some(endpoint) => Arc::new(
            HttpBulkImporter::new(endpoint, config.bulk.api_token.as_deref())
                .with_timeout(Duration::from_secs(config.bulk.timeout_sec)),
        ),
        None => Arc::new(UnconfiguredBulkImporter),
    };

    let mut pipeline = IngestionPipeline::new(
        storage,
        extractor,
        resolver,
        committer,
        bulk,
        EnhancementCoordinator::new(engine),
    );

    let status = if cli_args.publish {
        DraftStatus::Published
    } else {
        DraftStatus::Draft
    };

    match pipeline.start(inputs).await? {
        StartOutcome::BulkImported(stats) => {
            println!(
                "Bulk import finished: {} created, {} duplicates, {} errors",
                stats.created, stats.duplicates, stats.errors
            );
            return Ok(());
        }
        StartOutcome::Interactive => {}
    }

    drive(&mut pipeline, status, cli_args.on_duplicate).await
}

/// Walk the interactive machine headlessly, taking the permissive branch
/// at each decision point.
async fn drive(
    pipeline: &mut IngestionPipeline,
    status: DraftStatus,
    on_duplicate: OnDuplicate,
) -> Result<()> {
    loop {
        match pipeline.state().clone() {
            PipelineState::QualityTip { tips } => {
                for tip in &tips {
                    warn!("Photo quality tip: {}", tip);
                }
                pipeline.continue_anyway()?;
            }
            PipelineState::MultiProductDetected { detect } => {
                info!("Photo shows {} products, splitting", detect.count);
                let outcome = pipeline.save_separately().await?;
                for (index, error) in &outcome.failed {
                    warn!("Detected product {} failed to save: {}", index, error);
                }
            }
            PipelineState::Review | PipelineState::ManualEntry => {
                if !pipeline.draft().has_title() {
                    // Headless run with no extraction result: fall back
                    // to the filename-less generic title so the commit
                    // guard has something to hold on to.
                    let fallback = pipeline
                        .draft()
                        .image_url
                        .clone()
                        .unwrap_or_else(|| "producto sin titulo".to_string());
                    warn!("No title extracted, using fallback");
                    pipeline.draft_mut()?.title = title_from_url(&fallback);
                }
                match pipeline.save(status).await {
                    Ok(SaveOutcome::DuplicatesFound(count)) => match on_duplicate {
                        OnDuplicate::Save => {
                            info!("{} possible duplicates, saving anyway", count);
                            pipeline.save_anyway().await?;
                        }
                        OnDuplicate::Skip => {
                            if let PipelineState::DuplicateCheck { candidates } = pipeline.state() {
                                for candidate in candidates {
                                    println!(
                                        "  duplicate candidate: {} (similarity {:.2})",
                                        candidate.title, candidate.similarity
                                    );
                                }
                            }
                            println!(
                                "Skipped: possible duplicates found. Rerun with --on-duplicate save to commit."
                            );
                            pipeline.close()?;
                            return Ok(());
                        }
                    },
                    Ok(SaveOutcome::BatchInterrupted { dropped, reason, .. }) => {
                        warn!("Batch ended early, {} file(s) not ingested: {}", dropped, reason);
                    }
                    Ok(_) => {}
                    Err(IngestError::Commit(e)) => {
                        pipeline.close()?;
                        bail!("Commit failed: {}", e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            PipelineState::Committed { record_ids } => {
                println!("Committed {} record(s):", record_ids.len());
                for id in &record_ids {
                    println!("  {}", id);
                }
                return Ok(());
            }
            other => {
                bail!("Pipeline stalled in state {}", other.name());
            }
        }
    }
}

fn title_from_url(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or(url);
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let cleaned: String = stem
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "producto sin titulo".to_string()
    } else {
        cleaned.to_string()
    }
}
