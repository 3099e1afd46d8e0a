//! Multi-action extraction facade.
//!
//! Fans a requested action set out to the vision provider and the image
//! engine. Actions are independent: each may fail on its own, and the
//! outcome carries whatever subset succeeded plus the failures.

use super::{
    AiAction, AiError, Enhancement, FailedAction, ImageEngine, InferenceOutcome, VisionProvider,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ExtractionClient {
    vision: Arc<dyn VisionProvider>,
    engine: Arc<dyn ImageEngine>,
}

impl ExtractionClient {
    pub fn new(vision: Arc<dyn VisionProvider>, engine: Arc<dyn ImageEngine>) -> Self {
        Self { vision, engine }
    }

    /// Run the requested actions against one asset.
    ///
    /// Returns `Err` only for an invalid request (no actions, empty URL
    /// on actions that need one); provider failures land in
    /// [`InferenceOutcome::failed`] instead.
    pub async fn infer(
        &self,
        asset_url: &str,
        actions: &[AiAction],
        prompt: Option<&str>,
    ) -> Result<InferenceOutcome, AiError> {
        if actions.is_empty() {
            return Err(AiError::InvalidInput("no actions requested".to_string()));
        }
        if asset_url.is_empty() && !matches!(actions, [AiAction::Generate]) {
            return Err(AiError::InvalidInput("empty asset url".to_string()));
        }

        let mut outcome = InferenceOutcome::default();

        for &action in actions {
            let result = self.run_action(action, asset_url, prompt, &mut outcome).await;
            if let Err(e) = result {
                warn!(action = action.as_str(), error = %e, "AI action failed");
                outcome.failed.push(FailedAction {
                    action,
                    reason: e.to_string(),
                });
            }
        }

        debug!(
            requested = actions.len(),
            failed = outcome.failed.len(),
            "Inference pass complete"
        );

        Ok(outcome)
    }

    async fn run_action(
        &self,
        action: AiAction,
        asset_url: &str,
        prompt: Option<&str>,
        outcome: &mut InferenceOutcome,
    ) -> Result<(), AiError> {
        match action {
            AiAction::Analyze => {
                outcome.analysis = Some(self.vision.analyze(asset_url).await?);
            }
            AiAction::DetectMulti => {
                outcome.multi_detect = Some(self.vision.detect_multi(asset_url).await?);
            }
            AiAction::Optimize => {
                let url = self
                    .engine
                    .transform(Enhancement::Optimize, Some(asset_url), None)
                    .await?;
                outcome.optimized_url = Some(url);
            }
            AiAction::RemoveBg | AiAction::Upscale => {
                // Both carry the same "new derived asset" meaning.
                let enhancement = action.enhancement().unwrap_or(Enhancement::Upscale);
                let url = self
                    .engine
                    .transform(enhancement, Some(asset_url), None)
                    .await?;
                outcome.enhanced_url = Some(url);
            }
            AiAction::Generate => {
                let url = self
                    .engine
                    .transform(Enhancement::Generate, None, prompt)
                    .await?;
                outcome.generated_url = Some(url);
            }
        }
        Ok(())
    }
}
