//! Fallback transport: the host's chat provider.

use std::sync::Arc;

use async_trait::async_trait;

use super::ClassifierTransport;
use crate::error::ClassifierError;

/// Completion returned by a host chat provider.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub completion_text: String,
}

/// A chat provider supplied by the embedding application.
///
/// Its default model is trusted; the classifier never tries to pick one.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Model the provider talks to, for logs.
    fn model_name(&self) -> &str;

    async fn text_chat(
        &self,
        prompt: &str,
        image_urls: &[String],
        session_id: Option<&str>,
    ) -> Result<ChatCompletion, ClassifierError>;
}

/// Adapts a `ChatProvider` to `ClassifierTransport`.
pub struct ProviderTransport {
    provider: Arc<dyn ChatProvider>,
}

impl ProviderTransport {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ClassifierTransport for ProviderTransport {
    fn name(&self) -> &str {
        "provider"
    }

    async fn complete(
        &self,
        prompt: &str,
        image_urls: &[String],
    ) -> Result<String, ClassifierError> {
        let completion = self.provider.text_chat(prompt, image_urls, None).await?;
        Ok(completion.completion_text)
    }
}
