//! Common test infrastructure.
//!
//! Builds a full ingestion pipeline over in-memory collaborators:
//! scriptable AI providers, an in-memory storage broker and an
//! in-memory catalog store. Tests import from here only.

mod mocks;

pub use mocks::{ScriptedImageEngine, ScriptedVisionProvider};

use catalog_ingest::ai::ExtractionClient;
use catalog_ingest::bulk::UnconfiguredBulkImporter;
use catalog_ingest::catalog::MemoryCatalogStore;
use catalog_ingest::commit::Committer;
use catalog_ingest::dedup::DuplicateResolver;
use catalog_ingest::enhance::EnhancementCoordinator;
use catalog_ingest::model::{
    AnalysisResult, DetectedProduct, InputKind, MultiDetectResult, PhotoQuality, RawInput,
};
use catalog_ingest::pipeline::IngestionPipeline;
use catalog_ingest::storage::MemoryStorageBroker;
use std::sync::Arc;

pub const BUSINESS: &str = "biz-test";

pub struct TestHarness {
    pub pipeline: IngestionPipeline,
    pub vision: Arc<ScriptedVisionProvider>,
    pub engine: Arc<ScriptedImageEngine>,
    pub storage: Arc<MemoryStorageBroker>,
    pub store: Arc<MemoryCatalogStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let vision = Arc::new(ScriptedVisionProvider::new());
        let engine = Arc::new(ScriptedImageEngine::new());
        let storage = Arc::new(MemoryStorageBroker::new());
        let store = Arc::new(MemoryCatalogStore::new());

        let extractor = Arc::new(ExtractionClient::new(vision.clone(), engine.clone()));
        let resolver = DuplicateResolver::new(store.clone());
        let committer = Committer::new(store.clone(), BUSINESS);
        let pipeline = IngestionPipeline::new(
            storage.clone(),
            extractor,
            resolver,
            committer,
            Arc::new(UnconfiguredBulkImporter),
            EnhancementCoordinator::new(engine.clone()),
        );

        Self {
            pipeline,
            vision,
            engine,
            storage,
            store,
        }
    }
}

pub fn photo(name: &str) -> RawInput {
    RawInput {
        kind: InputKind::Image,
        bytes: vec![0xff, 0xd8, 0xff, 0xe0],
        original_name: name.to_string(),
        content_type: "image/jpeg".to_string(),
    }
}

pub fn spreadsheet(name: &str) -> RawInput {
    RawInput {
        kind: InputKind::Spreadsheet,
        bytes: vec![0x50, 0x4b, 0x03, 0x04],
        original_name: name.to_string(),
        content_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            .to_string(),
    }
}

pub fn analysis(title: &str, confidence: f32) -> AnalysisResult {
    AnalysisResult {
        title: title.to_string(),
        description: format!("{} description", title),
        price: Some(25.0),
        currency: Some("PEN".to_string()),
        category: "Herramientas".to_string(),
        confidence,
        photo_quality: PhotoQuality::Good,
        ..Default::default()
    }
}

pub fn poor_analysis(title: &str) -> AnalysisResult {
    AnalysisResult {
        photo_quality: PhotoQuality::Poor,
        photo_tips: vec![
            "Acerca la cámara al producto".to_string(),
            "Usa mejor iluminación".to_string(),
        ],
        ..analysis(title, 0.4)
    }
}

pub fn multi_detect(names: &[&str]) -> MultiDetectResult {
    MultiDetectResult {
        multiple_products: true,
        count: names.len(),
        products: names
            .iter()
            .map(|name| DetectedProduct {
                name: name.to_string(),
                description: format!("{} detected", name),
                category: "Abarrotes".to_string(),
                position: "center".to_string(),
            })
            .collect(),
    }
}
