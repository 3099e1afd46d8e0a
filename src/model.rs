//! Shared data model for the ingestion pipeline.
//!
//! These types cross module boundaries: raw inputs coming from the user,
//! uploaded asset references, AI analysis output, the editable draft, and
//! the advisory duplicate candidates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of a user-supplied file, as far as ingestion cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Image,
    Document,
    Spreadsheet,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Image => "image",
            InputKind::Document => "document",
            InputKind::Spreadsheet => "spreadsheet",
        }
    }
}

/// An opaque handle to a user-supplied file. Consumed once uploaded.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub kind: InputKind,
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub content_type: String,
}

impl RawInput {
    pub fn new(
        kind: InputKind,
        bytes: Vec<u8>,
        original_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            bytes,
            original_name: original_name.into(),
            content_type: content_type.into(),
        }
    }
}

/// A stable addressable reference to an uploaded or derived image.
///
/// Immutable once created; enhancement produces a new asset, never edits
/// one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
    pub kind: InputKind,
}

impl UploadedAsset {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: InputKind::Image,
        }
    }
}

/// AI-reported photo quality for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoQuality {
    Poor,
    #[default]
    Fair,
    Good,
}

/// Structured AI output for one asset. Read-only input to drafting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
    /// Provider certainty in [0, 1]. A provider that omits it gets 0.0
    /// (lowest trust), never a locally-invented value.
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub photo_quality: PhotoQuality,
    #[serde(default)]
    pub photo_tips: Vec<String>,
}

/// One product spotted inside a multi-product photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Rough location in the image ("left", "top-right", ...).
    #[serde(default)]
    pub position: String,
}

/// Signal that one asset depicts several distinct sellable items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiDetectResult {
    #[serde(default)]
    pub multiple_products: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub products: Vec<DetectedProduct>,
}

impl MultiDetectResult {
    /// True when the detection actually warrants the split path.
    pub fn is_actionable(&self) -> bool {
        self.multiple_products && self.count > 1
    }
}

/// Publication status of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Published,
    Draft,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Published => "published",
            DraftStatus::Draft => "draft",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "published" => Some(DraftStatus::Published),
            "draft" => Some(DraftStatus::Draft),
            _ => None,
        }
    }
}

/// Where a record came from. Carried through to the catalog for later
/// auditing of AI-assisted entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    ManualPhoto,
    ManualPhotoMulti,
    ManualComplete,
    BulkImport,
    AiGeneratedImage,
}

impl ImportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportSource::ManualPhoto => "manual_photo",
            ImportSource::ManualPhotoMulti => "manual_photo_multi",
            ImportSource::ManualComplete => "manual_complete",
            ImportSource::BulkImport => "bulk_import",
            ImportSource::AiGeneratedImage => "ai_generated_image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual_photo" => Some(ImportSource::ManualPhoto),
            "manual_photo_multi" => Some(ImportSource::ManualPhotoMulti),
            "manual_complete" => Some(ImportSource::ManualComplete),
            "bulk_import" => Some(ImportSource::BulkImport),
            "ai_generated_image" => Some(ImportSource::AiGeneratedImage),
            _ => None,
        }
    }
}

/// The mutable record under construction. Exactly one draft is active per
/// pipeline instance at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDraft {
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub category: String,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub unit: String,
    pub stock: Option<u32>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub status: DraftStatus,
    pub import_source: ImportSource,
    pub ai_confidence: Option<f32>,
}

impl ProductDraft {
    /// An empty draft for manual entry.
    pub fn empty() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            price: None,
            currency: None,
            category: String::new(),
            brand: None,
            sku: None,
            unit: "unidad".to_string(),
            stock: None,
            tags: Vec::new(),
            image_url: None,
            attributes: BTreeMap::new(),
            status: DraftStatus::Published,
            import_source: ImportSource::ManualComplete,
            ai_confidence: None,
        }
    }

    /// Pre-fill a draft from an analysis result and the asset it came from.
    pub fn from_analysis(analysis: &AnalysisResult, image_url: &str) -> Self {
        Self {
            title: analysis.title.clone(),
            description: analysis.description.clone(),
            price: analysis.price,
            currency: analysis.currency.clone(),
            category: analysis.category.clone(),
            brand: analysis.brand.clone(),
            sku: analysis.sku.clone(),
            unit: analysis
                .unit
                .clone()
                .unwrap_or_else(|| "unidad".to_string()),
            stock: None,
            tags: analysis.tags.clone(),
            image_url: Some(image_url.to_string()),
            attributes: analysis.attributes.clone(),
            status: DraftStatus::Published,
            import_source: ImportSource::ManualPhoto,
            ai_confidence: Some(analysis.confidence),
        }
    }

    /// A draft with only the uploaded image attached, for when AI
    /// extraction failed but ingestion continues.
    pub fn image_only(image_url: &str) -> Self {
        let mut draft = Self::empty();
        draft.image_url = Some(image_url.to_string());
        draft.import_source = ImportSource::ManualPhoto;
        draft
    }

    /// One draft per detected product in a multi-product photo. All share
    /// the source image and start as unpublished drafts.
    pub fn from_detected(product: &DetectedProduct, image_url: Option<&str>) -> Self {
        let mut draft = Self::empty();
        draft.title = product.name.clone();
        draft.description = product.description.clone();
        draft.category = product.category.clone();
        draft.image_url = image_url.map(str::to_string);
        draft.status = DraftStatus::Draft;
        draft.import_source = ImportSource::ManualPhotoMulti;
        // The per-product detection is coarser than a dedicated analysis.
        draft.ai_confidence = Some(0.7);
        draft
    }

    /// Fold an analysis into an existing draft. AI values win where the
    /// provider produced one; fields it left blank keep their current
    /// (possibly hand-edited) values.
    pub fn merge_analysis(&mut self, analysis: &AnalysisResult) {
        if !analysis.title.trim().is_empty() {
            self.title = analysis.title.clone();
        }
        if !analysis.description.trim().is_empty() {
            self.description = analysis.description.clone();
        }
        if analysis.price.is_some() {
            self.price = analysis.price;
            self.currency = analysis.currency.clone();
        }
        if !analysis.category.trim().is_empty() {
            self.category = analysis.category.clone();
        }
        if analysis.brand.is_some() {
            self.brand = analysis.brand.clone();
        }
        if analysis.sku.is_some() {
            self.sku = analysis.sku.clone();
        }
        if let Some(unit) = &analysis.unit {
            self.unit = unit.clone();
        }
        if !analysis.tags.is_empty() {
            self.tags = analysis.tags.clone();
        }
        for (key, value) in &analysis.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
        self.import_source = ImportSource::ManualPhoto;
        self.ai_confidence = Some(analysis.confidence);
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// An existing catalog record flagged as possibly identical to the draft.
/// Advisory only; it never blocks commit outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub id: RecordId,
    pub title: String,
    pub price: Option<f64>,
    pub similarity: f32,
}

/// Identifier of a committed catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome summary from the bulk-import sibling flow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BulkImportStats {
    pub created: usize,
    pub duplicates: usize,
    pub errors: usize,
}
