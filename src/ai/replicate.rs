//! Predictions-style image engine (Replicate dialect).
//!
//! Each transform creates a prediction and polls it until it settles.
//! Every successful transform yields a brand new asset URL; sources are
//! never modified.

use super::{AiError, Enhancement, ImageEngine};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Model versions used per enhancement.
#[derive(Debug, Clone)]
pub struct ReplicateModels {
    /// Real-ESRGAN, scale 2. Light cleanup pass after upload.
    pub optimize: String,
    /// Background removal.
    pub remove_bg: String,
    /// Real-ESRGAN, scale 4.
    pub upscale: String,
    /// SDXL text-to-image.
    pub generate: String,
}

impl Default for ReplicateModels {
    fn default() -> Self {
        Self {
            optimize: "nightmareai/real-esrgan:42fed1c4974146d4d2414e2be2c5277c7fcf05fcc3a73abf41610695738c1d7b".to_string(),
            remove_bg: "lucataco/remove-bg:95fcc2a26d3899cd6c2691c900465aaeff466285a65c14638cc5f36f34befaf1".to_string(),
            upscale: "nightmareai/real-esrgan:42fed1c4974146d4d2414e2be2c5277c7fcf05fcc3a73abf41610695738c1d7b".to_string(),
            generate: "stability-ai/sdxl:39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b".to_string(),
        }
    }
}

pub struct ReplicateImageEngine {
    client: Client,
    base_url: String,
    api_token: String,
    models: ReplicateModels,
    poll_interval: Duration,
    max_polls: usize,
}

impl ReplicateImageEngine {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            models: ReplicateModels::default(),
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
        }
    }

    pub fn with_models(mut self, models: ReplicateModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn model_and_input(
        &self,
        enhancement: Enhancement,
        image_url: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<(&str, serde_json::Value), AiError> {
        let need_image = || {
            image_url
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .ok_or_else(|| AiError::InvalidInput("enhancement requires a source image".to_string()))
        };

        match enhancement {
            Enhancement::Optimize => Ok((
                self.models.optimize.as_str(),
                json!({ "image": need_image()?, "scale": 2, "face_enhance": false }),
            )),
            Enhancement::RemoveBg => Ok((
                self.models.remove_bg.as_str(),
                json!({ "image": need_image()? }),
            )),
            Enhancement::Upscale => Ok((
                self.models.upscale.as_str(),
                json!({ "image": need_image()?, "scale": 4, "face_enhance": false }),
            )),
            Enhancement::Generate => {
                let prompt = prompt
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| AiError::InvalidInput("generation requires a prompt".to_string()))?;
                Ok((
                    self.models.generate.as_str(),
                    json!({
                        "prompt": prompt,
                        "negative_prompt": "blurry, low quality, distorted",
                        "width": 1024,
                        "height": 1024,
                        "num_outputs": 1,
                        "num_inference_steps": 25,
                        "guidance_scale": 7.5,
                    }),
                ))
            }
        }
    }

    async fn create_prediction(
        &self,
        model_version: &str,
        input: serde_json::Value,
    ) -> Result<Prediction, AiError> {
        let url = format!("{}/v1/predictions", self.base_url);
        let version = model_version
            .rsplit(':')
            .next()
            .unwrap_or(model_version)
            .to_string();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&PredictionRequest { version, input })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AiError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse prediction: {}", e)))
    }

    async fn poll_prediction(&self, id: &str) -> Result<Prediction, AiError> {
        let url = format!("{}/v1/predictions/{}", self.base_url, id);

        for _ in 0..self.max_polls {
            let response = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", self.api_token))
                .send()
                .await
                .map_err(|e| AiError::Connection(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(AiError::Api {
                    status,
                    message: body,
                });
            }

            let prediction: Prediction = response.json().await.map_err(|e| {
                AiError::InvalidResponse(format!("Failed to parse prediction: {}", e))
            })?;

            match prediction.status.as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    return Err(AiError::Api {
                        status: 200,
                        message: prediction
                            .error
                            .unwrap_or_else(|| "prediction failed".to_string()),
                    });
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }

        warn!(prediction = %id, "Prediction did not settle in time");
        Err(AiError::Timeout)
    }
}

#[async_trait]
impl ImageEngine for ReplicateImageEngine {
    async fn transform(
        &self,
        enhancement: Enhancement,
        image_url: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String, AiError> {
        let (model, input) = self.model_and_input(enhancement, image_url, prompt)?;

        debug!(enhancement = enhancement.as_str(), "Creating prediction");
        let created = self.create_prediction(model, input).await?;
        let settled = match created.status.as_str() {
            "succeeded" => created,
            _ => self.poll_prediction(&created.id).await?,
        };

        settled
            .output_url()
            .ok_or_else(|| AiError::InvalidResponse("prediction produced no output".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    version: String,
    input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl Prediction {
    /// Output is either a bare URL string or an array of URLs.
    fn output_url(&self) -> Option<String> {
        match &self.output {
            Some(serde_json::Value::String(url)) => Some(url.clone()),
            Some(serde_json::Value::Array(urls)) => urls
                .first()
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}
