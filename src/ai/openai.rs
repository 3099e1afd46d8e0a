//! OpenAI-compatible vision provider.
//!
//! Works with OpenAI, OpenRouter, Together AI, vLLM, and any other
//! service implementing the chat completions API with image inputs.

use super::{extract_json_object, AiError, VisionProvider};
use crate::model::{AnalysisResult, MultiDetectResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for api_key_command execution.
const API_KEY_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const ANALYZE_PROMPT: &str = r#"Analyze this product photo for a merchant catalog in Peru.

Extract, in Spanish where the field is free text:
- title: short commercial product name (max 60 chars, include brand if visible)
- description: persuasive description, 80-120 words
- price: numeric price if visible on a tag or label, else null
- currency: ISO code when a price is visible (PEN, USD, ...)
- category and subcategory
- brand, sku, unit ("unidad", "par", "caja", "kg", ...)
- attributes: map of color/material/size/style when identifiable
- tags: 5-8 search keywords
- condition: "nuevo" or "usado" judged from appearance
- confidence: your overall certainty, 0.0 to 1.0
- photo_quality: "poor", "fair" or "good" (lighting, focus, framing)
- photo_tips: if quality is poor, 1-3 concrete retake suggestions

Respond ONLY with a valid JSON object using exactly those keys."#;

const DETECT_MULTI_PROMPT: &str = r#"Does this photo show more than one distinct sellable product?
Group variants of the same product (colors, sizes) as ONE product.

Respond ONLY with valid JSON:
{
  "multiple_products": true|false,
  "count": <int>,
  "products": [
    {"name": "...", "description": "...", "category": "...", "position": "left|center|right|top|bottom"}
  ]
}"#;

/// Source of the API key for authentication.
#[derive(Debug, Clone)]
pub enum ApiKeySource {
    /// No authentication.
    None,
    /// Static API key.
    Static(String),
    /// Shell command that outputs the API key (for rotating tokens).
    Command(String),
}

impl ApiKeySource {
    /// Get the current API key, executing the command if necessary.
    async fn get_key(&self) -> Result<Option<String>, AiError> {
        match self {
            ApiKeySource::None => Ok(None),
            ApiKeySource::Static(key) => Ok(Some(key.clone())),
            ApiKeySource::Command(cmd) => {
                debug!(command = %cmd, "Fetching API key via command");

                let result = tokio::time::timeout(
                    API_KEY_COMMAND_TIMEOUT,
                    Command::new("sh").arg("-c").arg(cmd).output(),
                )
                .await;

                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        warn!(command = %cmd, error = %e, "api_key_command failed to execute");
                        return Err(AiError::Connection(format!(
                            "Failed to execute api_key_command: {}",
                            e
                        )));
                    }
                    Err(_) => {
                        warn!(command = %cmd, "api_key_command timed out");
                        return Err(AiError::Timeout);
                    }
                };

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(command = %cmd, stderr = %stderr, "api_key_command failed");
                    return Err(AiError::Connection(format!(
                        "api_key_command failed with status {}: {}",
                        output.status, stderr
                    )));
                }

                let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if key.is_empty() {
                    warn!(command = %cmd, "api_key_command returned empty key");
                    return Err(AiError::Connection(
                        "api_key_command returned empty key".to_string(),
                    ));
                }

                Ok(Some(key))
            }
        }
    }
}

/// Vision extraction over any OpenAI-compatible chat completions API.
pub struct OpenAiVisionProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key_source: ApiKeySource,
    timeout: Duration,
}

impl OpenAiVisionProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let api_key_source = match api_key {
            Some(key) => ApiKeySource::Static(key),
            None => ApiKeySource::None,
        };
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key_source,
            timeout: Duration::from_secs(60),
        }
    }

    /// Use a shell command executed before each request to fetch a fresh
    /// token. Useful for rotating tokens or secret stores.
    pub fn with_key_command(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key_command: String,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key_source: ApiKeySource::Command(api_key_command),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one vision request and return the model's text reply.
    async fn complete(&self, image_url: &str, prompt: &str) -> Result<String, AiError> {
        if image_url.is_empty() {
            return Err(AiError::InvalidInput("empty image url".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlPart {
                            url: image_url.to_string(),
                        },
                    },
                ],
            }],
            temperature: 0.1,
        };

        debug!(model = %self.model, image_url = %image_url, "Sending vision request");

        let mut req = self.client.post(&url).json(&request).timeout(self.timeout);
        if let Some(api_key) = self.api_key_source.get_key().await? {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::InvalidResponse("no choices in response".to_string()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl VisionProvider for OpenAiVisionProvider {
    async fn analyze(&self, image_url: &str) -> Result<AnalysisResult, AiError> {
        let text = self.complete(image_url, ANALYZE_PROMPT).await?;
        let json = extract_json_object(&text)?;
        serde_json::from_str(json)
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse analysis: {}", e)))
    }

    async fn detect_multi(&self, image_url: &str) -> Result<MultiDetectResult, AiError> {
        let text = self.complete(image_url, DETECT_MULTI_PROMPT).await?;
        let json = extract_json_object(&text)?;
        serde_json::from_str(json)
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse detection: {}", e)))
    }
}

// Chat completions wire types.

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlPart },
}

#[derive(Debug, Serialize)]
struct ImageUrlPart {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: "describe".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlPart {
                            url: "https://img/1.jpg".to_string(),
                        },
                    },
                ],
            }],
            temperature: 0.1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "https://img/1.jpg"
        );
    }

    #[test]
    fn test_analysis_parse_from_fenced_reply() {
        let reply = "```json\n{\"title\":\"Pintura 3M\",\"confidence\":0.9,\"photo_quality\":\"good\"}\n```";
        let json = extract_json_object(reply).unwrap();
        let analysis: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.title, "Pintura 3M");
        assert_eq!(analysis.confidence, 0.9);
    }
}
