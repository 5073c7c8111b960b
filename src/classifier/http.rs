//! Direct transport: OpenAI-compatible chat completions over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::ClassifierTransport;
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;

/// Model used when the config names none.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Response token budget. Two short lines is all we ask for.
pub(crate) const MAX_TOKENS: u32 = 100;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TRANSPORT_NAME: &str = "direct";

/// Posts prompt + image URLs to `{base_url}/v1/chat/completions`.
pub struct DirectHttpTransport {
    name: &'static str,
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl DirectHttpTransport {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: Option<String>,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassifierError::RequestFailed {
                transport: TRANSPORT_NAME.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            name: TRANSPORT_NAME,
            client,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Build from config when both key and base URL are present.
    pub fn from_config(config: &ClassifierConfig) -> Result<Option<Self>, ClassifierError> {
        match (&config.api_key, &config.base_url) {
            (Some(key), Some(base)) => Self::new(base, key.clone(), config.model.clone()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Relabel the transport in logs and errors.
    pub(crate) fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request<'a>(model: &'a str, prompt: &'a str, image_urls: &'a [String]) -> ChatRequest<'a> {
    let mut content = Vec::with_capacity(image_urls.len() + 1);
    content.push(ContentPart::Text { text: prompt });
    content.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
        image_url: ImageUrl { url },
    }));

    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
        max_tokens: MAX_TOKENS,
    }
}

#[async_trait]
impl ClassifierTransport for DirectHttpTransport {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        image_urls: &[String],
    ) -> Result<String, ClassifierError> {
        let body = build_request(&self.model, prompt, image_urls);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::RequestFailed {
                transport: self.name.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::HttpStatus {
                transport: self.name.into(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse =
            resp.json()
                .await
                .map_err(|e| ClassifierError::InvalidResponse {
                    transport: self.name.into(),
                    reason: e.to_string(),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::InvalidResponse {
                transport: self.name.into(),
                reason: "missing choices[0].message.content".into(),
            })
    }
}
