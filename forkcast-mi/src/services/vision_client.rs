//! Anthropic Messages API client
//!
//! Implements [`VisionCapability`] over the hosted vision model. Each call
//! sends one base64 image block plus one text block and returns the first
//! text block of the reply verbatim. Callers own all interpretation of the
//! returned text, including code fence stripping and JSON parsing, and all
//! failure absorption. The client never retries.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::types::{EncodedImage, VisionCapability, VisionError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const USER_AGENT: &str = "forkcast-mi/0.1.0";

/// Vision calls run long on dense menu photos, so the timeout is far more
/// generous than the metadata and photo download timeouts.
const VISION_TIMEOUT: Duration = Duration::from_secs(120);

/// Messages API reply, reduced to the content blocks we read.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Error payload shape: `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Anthropic Messages API client.
pub struct AnthropicVisionClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicVisionClient {
    pub fn new(api_key: String) -> Result<Self, VisionError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Construct against an alternate endpoint. Used by tests to point the
    /// client at a local stub server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, VisionError> {
        if api_key.trim().is_empty() {
            return Err(VisionError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(VISION_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Override the model id from configuration.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait::async_trait]
impl VisionCapability for AnthropicVisionClient {
    async fn describe_image(
        &self,
        image: &EncodedImage,
        system_instruction: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, VisionError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.base64,
                        },
                    },
                    {
                        "type": "text",
                        "text": prompt,
                    },
                ],
            }],
        });
        if let Some(system) = system_instruction {
            body["system"] = json!(system);
        }

        tracing::debug!(
            model = %self.model,
            media_type = image.media_type,
            max_tokens = max_tokens,
            "Sending vision request"
        );

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &error_text));
        }

        let reply: MessagesResponse = response.json().await?;
        let text = extract_text(&reply)?;

        tracing::debug!(reply_len = text.len(), "Vision request completed");

        Ok(text)
    }
}

/// Pull the first non-empty text block out of a reply.
fn extract_text(reply: &MessagesResponse) -> Result<String, VisionError> {
    reply
        .content
        .iter()
        .find(|block| block.kind == "text" && !block.text.is_empty())
        .map(|block| block.text.clone())
        .ok_or(VisionError::EmptyResponse)
}

/// Map a non-2xx reply to [`VisionError::Api`], preferring the structured
/// error message when the body parses.
fn api_error(status: u16, body: &str) -> VisionError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|parsed| parsed.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.to_string());
    VisionError::Api { status, message }
}
