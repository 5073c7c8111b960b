//! The service's own chat providers.
//!
//! Used as the fallback transport when the moderation policy names no
//! independent vision endpoint. Supports:
//! - **OpenAI**: `/v1/chat/completions` (any compatible server via `OPENAI_BASE_URL`)
//! - **Anthropic**: `/v1/messages` with URL image sources

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::http::{DirectHttpTransport, MAX_TOKENS, REQUEST_TIMEOUT};
use super::provider::{ChatCompletion, ChatProvider};
use super::ClassifierTransport;
use crate::config::{LlmBackend, LlmConfig};
use crate::error::ClassifierError;

const OPENAI_API_BASE: &str = "https://api.openai.com";
const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Create a chat provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn ChatProvider>, ClassifierError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn ChatProvider>, ClassifierError> {
    let base = config.base_url.as_deref().unwrap_or(OPENAI_API_BASE);
    let provider = OpenAiProvider::new(base, config.api_key.clone(), &config.model)?;
    tracing::info!("Fallback provider: OpenAI (model: {})", config.model);
    Ok(Arc::new(provider))
}

fn create_anthropic_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn ChatProvider>, ClassifierError> {
    let base = config.base_url.as_deref().unwrap_or(ANTHROPIC_API_BASE);
    let provider = AnthropicProvider::new(base, config.api_key.clone(), &config.model)?;
    tracing::info!("Fallback provider: Anthropic (model: {})", config.model);
    Ok(Arc::new(provider))
}

// ── OpenAI ──────────────────────────────────────────────────────────

/// OpenAI chat completions. Shares the wire format of the direct transport.
pub struct OpenAiProvider {
    inner: DirectHttpTransport,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: SecretString, model: &str) -> Result<Self, ClassifierError> {
        let inner =
            DirectHttpTransport::new(base_url, api_key, Some(model.to_string()))?.named("openai");
        Ok(Self { inner })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        self.inner.model()
    }

    async fn text_chat(
        &self,
        prompt: &str,
        image_urls: &[String],
        _session_id: Option<&str>,
    ) -> Result<ChatCompletion, ClassifierError> {
        let completion_text = self.inner.complete(prompt, image_urls).await?;
        Ok(ChatCompletion { completion_text })
    }
}

// ── Anthropic ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: Vec<AnthropicContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn build_messages_request<'a>(
    model: &'a str,
    prompt: &'a str,
    image_urls: &'a [String],
) -> MessagesRequest<'a> {
    // Images first, then the instruction.
    let mut content: Vec<AnthropicContent<'a>> = image_urls
        .iter()
        .map(|url| AnthropicContent::Image {
            source: ImageSource { kind: "url", url },
        })
        .collect();
    content.push(AnthropicContent::Text { text: prompt });

    MessagesRequest {
        model,
        max_tokens: MAX_TOKENS,
        messages: vec![AnthropicMessage {
            role: "user",
            content,
        }],
    }
}

/// Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl AnthropicProvider {
    pub fn new(base_url: &str, api_key: SecretString, model: &str) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassifierError::RequestFailed {
                transport: "anthropic".into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn text_chat(
        &self,
        prompt: &str,
        image_urls: &[String],
        _session_id: Option<&str>,
    ) -> Result<ChatCompletion, ClassifierError> {
        let body = build_messages_request(&self.model, prompt, image_urls);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::RequestFailed {
                transport: "anthropic".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::HttpStatus {
                transport: "anthropic".into(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: MessagesResponse =
            resp.json()
                .await
                .map_err(|e| ClassifierError::InvalidResponse {
                    transport: "anthropic".into(),
                    reason: e.to_string(),
                })?;

        let text: Vec<String> = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(ClassifierError::InvalidResponse {
                transport: "anthropic".into(),
                reason: "no text block in response content".into(),
            });
        }

        Ok(ChatCompletion {
            completion_text: text.join("\n"),
        })
    }
}
