//! Image enhancement with lineage tracking.
//!
//! Every transform produces a new derived asset. The chain is
//! non-destructive: the first asset seeded is kept and can be restored
//! at any point with [`EnhancementCoordinator::revert_to_original`].

use crate::ai::{AiError, Enhancement, ImageEngine};
use crate::model::{InputKind, UploadedAsset};
use std::sync::Arc;
use tracing::info;

pub struct EnhancementCoordinator {
    engine: Arc<dyn ImageEngine>,
    lineage: Vec<UploadedAsset>,
}

impl EnhancementCoordinator {
    pub fn new(engine: Arc<dyn ImageEngine>) -> Self {
        Self {
            engine,
            lineage: Vec::new(),
        }
    }

    /// Start a fresh lineage rooted at `asset`, discarding any previous
    /// chain.
    pub fn seed(&mut self, asset: UploadedAsset) {
        self.lineage.clear();
        self.lineage.push(asset);
    }

    /// The asset a draft should currently display.
    pub fn current(&self) -> Option<&UploadedAsset> {
        self.lineage.last()
    }

    /// The root of the chain, untouched by any transform.
    pub fn original(&self) -> Option<&UploadedAsset> {
        self.lineage.first()
    }

    /// Append an externally-produced derived asset (an optimized or
    /// generated image) on top of the chain.
    pub fn supersede(&mut self, asset: UploadedAsset) {
        self.lineage.push(asset);
    }

    /// Drop the whole lineage.
    pub fn clear(&mut self) {
        self.lineage.clear();
    }

    pub fn len(&self) -> usize {
        self.lineage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lineage.is_empty()
    }

    /// Apply one transform on top of the current asset and append the
    /// result to the lineage.
    ///
    /// `Generate` ignores the current asset and needs `title` to build
    /// its prompt; an empty title fails fast without a provider call.
    pub async fn enhance(
        &mut self,
        enhancement: Enhancement,
        title: &str,
        category: Option<&str>,
    ) -> Result<UploadedAsset, AiError> {
        let url = match enhancement {
            Enhancement::Generate => {
                if title.trim().is_empty() {
                    return Err(AiError::InvalidInput(
                        "a product title is required to generate an image".to_string(),
                    ));
                }
                let prompt = generation_prompt(title, category);
                self.engine
                    .transform(Enhancement::Generate, None, Some(&prompt))
                    .await?
            }
            _ => {
                let source = self.current().ok_or_else(|| {
                    AiError::InvalidInput("no image to enhance".to_string())
                })?;
                self.engine
                    .transform(enhancement, Some(&source.url), None)
                    .await?
            }
        };

        info!(
            enhancement = enhancement.as_str(),
            depth = self.lineage.len(),
            "Enhancement applied"
        );
        let derived = UploadedAsset {
            url,
            kind: InputKind::Image,
        };
        self.lineage.push(derived.clone());
        Ok(derived)
    }

    /// Drop every derived asset and make the root current again.
    ///
    /// No-op when nothing was enhanced or nothing is seeded.
    pub fn revert_to_original(&mut self) -> Option<&UploadedAsset> {
        self.lineage.truncate(1);
        self.lineage.first()
    }
}

fn generation_prompt(title: &str, category: Option<&str>) -> String {
    let mut prompt = title.trim().to_string();
    if let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(", ");
        prompt.push_str(category);
    }
    prompt.push_str(", product photography, professional lighting, high quality");
    prompt
}
