//! AI Extraction Client.
//!
//! Two provider seams sit underneath one facade:
//! - [`VisionProvider`]: structured extraction from an image (analysis,
//!   multi-product detection), implemented against any OpenAI-compatible
//!   chat completions endpoint with vision support.
//! - [`ImageEngine`]: pixel-level work (optimize, background removal,
//!   upscaling, generation), implemented against a predictions-style API.
//!
//! [`ExtractionClient`] fans a requested action set out across both and
//! reports per-action partial success; a multi-action request never fails
//! all-or-nothing.

mod client;
mod openai;
mod replicate;

pub use client::ExtractionClient;
pub use openai::{ApiKeySource, OpenAiVisionProvider};
pub use replicate::{ReplicateImageEngine, ReplicateModels};

use crate::model::{AnalysisResult, MultiDetectResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from AI providers.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One requestable unit of AI work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiAction {
    Analyze,
    DetectMulti,
    Optimize,
    RemoveBg,
    Upscale,
    Generate,
}

impl AiAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiAction::Analyze => "analyze",
            AiAction::DetectMulti => "detect_multi",
            AiAction::Optimize => "optimize",
            AiAction::RemoveBg => "remove_bg",
            AiAction::Upscale => "upscale",
            AiAction::Generate => "generate",
        }
    }

    /// Actions that run on the image engine rather than the vision model.
    pub fn enhancement(&self) -> Option<Enhancement> {
        match self {
            AiAction::Optimize => Some(Enhancement::Optimize),
            AiAction::RemoveBg => Some(Enhancement::RemoveBg),
            AiAction::Upscale => Some(Enhancement::Upscale),
            AiAction::Generate => Some(Enhancement::Generate),
            AiAction::Analyze | AiAction::DetectMulti => None,
        }
    }
}

/// Pixel-level transforms handled by the image engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enhancement {
    Optimize,
    RemoveBg,
    Upscale,
    Generate,
}

impl Enhancement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Enhancement::Optimize => "optimize",
            Enhancement::RemoveBg => "remove_bg",
            Enhancement::Upscale => "upscale",
            Enhancement::Generate => "generate",
        }
    }
}

/// An action that did not produce a result, with the provider's reason.
#[derive(Debug, Clone)]
pub struct FailedAction {
    pub action: AiAction,
    pub reason: String,
}

/// The subset of requested results that succeeded, plus the failures.
#[derive(Debug, Clone, Default)]
pub struct InferenceOutcome {
    pub analysis: Option<AnalysisResult>,
    pub multi_detect: Option<MultiDetectResult>,
    pub optimized_url: Option<String>,
    pub enhanced_url: Option<String>,
    pub generated_url: Option<String>,
    pub failed: Vec<FailedAction>,
}

impl InferenceOutcome {
    /// True when nothing at all came back.
    pub fn is_empty(&self) -> bool {
        self.analysis.is_none()
            && self.multi_detect.is_none()
            && self.optimized_url.is_none()
            && self.enhanced_url.is_none()
            && self.generated_url.is_none()
    }
}

/// Structured extraction from a product image.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn analyze(&self, image_url: &str) -> Result<AnalysisResult, AiError>;

    async fn detect_multi(&self, image_url: &str) -> Result<MultiDetectResult, AiError>;
}

/// Pixel-level image work. Every transform returns a reference to a new
/// asset; the source is never touched.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    async fn transform(
        &self,
        enhancement: Enhancement,
        image_url: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String, AiError>;
}

/// Stand-in for an unconfigured vision endpoint. Every call fails, which
/// the pipeline degrades from instead of aborting.
pub struct NoOpVisionProvider;

#[async_trait]
impl VisionProvider for NoOpVisionProvider {
    async fn analyze(&self, _image_url: &str) -> Result<AnalysisResult, AiError> {
        Err(AiError::InvalidInput(
            "no vision endpoint configured".to_string(),
        ))
    }

    async fn detect_multi(&self, _image_url: &str) -> Result<MultiDetectResult, AiError> {
        Err(AiError::InvalidInput(
            "no vision endpoint configured".to_string(),
        ))
    }
}

/// Stand-in for an unconfigured image engine.
pub struct NoOpImageEngine;

#[async_trait]
impl ImageEngine for NoOpImageEngine {
    async fn transform(
        &self,
        _enhancement: Enhancement,
        _image_url: Option<&str>,
        _prompt: Option<&str>,
    ) -> Result<String, AiError> {
        Err(AiError::InvalidInput(
            "no image engine configured".to_string(),
        ))
    }
}

/// Pull the first JSON object out of a prose-wrapped model response.
/// Providers routinely wrap their JSON in markdown fences or chatter.
pub(crate) fn extract_json_object(text: &str) -> Result<&str, AiError> {
    let start = text
        .find('{')
        .ok_or_else(|| AiError::InvalidResponse("no JSON object in response".to_string()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| AiError::InvalidResponse("unterminated JSON object".to_string()))?;
    if end < start {
        return Err(AiError::InvalidResponse(
            "malformed JSON object in response".to_string(),
        ));
    }
    Ok(&text[start..=end])
}
