//! Vision classifier.
//!
//! Builds the moderation prompt, sends it with the image URLs through a
//! `ClassifierTransport`, and parses the reply into a `Verdict`.
//!
//! Two transports exist:
//! - **Direct**: an OpenAI-compatible `/v1/chat/completions` endpoint with its
//!   own credentials (`DirectHttpTransport`).
//! - **Provider**: the service's own chat model (`host::create_provider`) or
//!   one supplied by an embedding application, wrapped in `ProviderTransport`.
//!
//! The transport is chosen once, when the classifier is built from config.

pub mod host;
pub mod http;
pub mod provider;
pub mod verdict;

pub use host::{AnthropicProvider, OpenAiProvider, create_provider};
pub use http::DirectHttpTransport;
pub use provider::{ChatCompletion, ChatProvider, ProviderTransport};
pub use verdict::{UNSPECIFIED_REASON, Verdict};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{ClassifierConfig, GuardConfig};
use crate::error::ClassifierError;
use crate::pipeline::extract::ImageRef;

/// What the classifier checks images against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationRule {
    pub forbidden_texts: Vec<String>,
    pub forbidden_descriptions: Vec<String>,
    pub custom_instruction: String,
}

impl ModerationRule {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            forbidden_texts: config.sensitive_texts.clone(),
            forbidden_descriptions: config.forbidden_descriptions.clone(),
            custom_instruction: config.custom_vision_prompt.clone(),
        }
    }

    /// No forbidden texts and no forbidden descriptions: nothing to enforce.
    pub fn is_empty(&self) -> bool {
        self.forbidden_texts.is_empty() && self.forbidden_descriptions.is_empty()
    }
}

/// A chat-completion backend that accepts a text prompt plus image URLs.
#[async_trait]
pub trait ClassifierTransport: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &str;

    /// Send the prompt and images, returning the raw model text.
    async fn complete(&self, prompt: &str, image_urls: &[String])
    -> Result<String, ClassifierError>;
}

/// Pick the transport for a config snapshot.
///
/// Direct credentials win; otherwise the host's provider is wrapped. `Ok(None)`
/// means no transport is usable.
pub fn select_transport(
    config: &ClassifierConfig,
    fallback: Option<Arc<dyn ChatProvider>>,
) -> Result<Option<Arc<dyn ClassifierTransport>>, ClassifierError> {
    if let Some(direct) = DirectHttpTransport::from_config(config)? {
        info!(
            model = direct.model(),
            "Using independent vision endpoint for audits"
        );
        return Ok(Some(Arc::new(direct)));
    }

    Ok(fallback.map(|provider| {
        info!(
            model = provider.model_name(),
            "Using fallback chat provider for audits"
        );
        Arc::new(ProviderTransport::new(provider)) as Arc<dyn ClassifierTransport>
    }))
}

/// Classifies image sets against a moderation rule.
#[derive(Clone)]
pub struct VerdictClassifier {
    transport: Option<Arc<dyn ClassifierTransport>>,
}

impl VerdictClassifier {
    pub fn new(transport: Option<Arc<dyn ClassifierTransport>>) -> Self {
        Self { transport }
    }

    /// Build from config, choosing the transport now.
    pub fn from_config(
        config: &ClassifierConfig,
        fallback: Option<Arc<dyn ChatProvider>>,
    ) -> Result<Self, ClassifierError> {
        Ok(Self::new(select_transport(config, fallback)?))
    }

    pub fn is_available(&self) -> bool {
        self.transport.is_some()
    }

    /// Classify `images` against `rule`.
    pub async fn classify(
        &self,
        rule: &ModerationRule,
        images: &[ImageRef],
    ) -> Result<Verdict, ClassifierError> {
        let transport = self.transport.as_ref().ok_or(ClassifierError::Unavailable)?;

        let prompt = build_prompt(rule);
        let urls: Vec<String> = images.iter().map(|img| img.url.clone()).collect();

        let raw = transport.complete(&prompt, &urls).await?;
        debug!(
            transport = transport.name(),
            images = urls.len(),
            raw_response = %raw,
            "Classifier responded"
        );

        Ok(Verdict::parse(&raw))
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the moderation prompt for a rule.
pub fn build_prompt(rule: &ModerationRule) -> String {
    format!(
        "你是一个严格但公正的内容审核员。请分析图片是否包含违规信息。\n\
         【自定义关注点】\n{custom}\n\n\
         【违规标准】\n\
         1. 包含文字：{texts}\n\
         2. 包含画面：{descs}\n\n\
         【输出格式要求】\n\
         请严格按照以下两行格式输出，不要包含其他废话：\n\
         REASON: [这里简要说明判断理由，不超过20字]\n\
         RESULT: [SAFE 或 VIOLATION]\n",
        custom = rule.custom_instruction,
        texts = render_list(&rule.forbidden_texts),
        descs = render_list(&rule.forbidden_descriptions),
    )
}

/// Render a list literally, e.g. `['a', "it's"]`.
///
/// Each item is quoted the way a Python `repr` would quote it: single quotes
/// unless the item contains `'` and no `"`, with control characters escaped so
/// the list stays on one line.
fn render_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| quote_literal(item)).collect();
    format!("[{}]", quoted.join(", "))
}

fn quote_literal(item: &str) -> String {
    let quote = if item.contains('\'') && !item.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(item.len() + 2);
    out.push(quote);
    for c in item.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            // Unicode control characters all sit below U+00A0.
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
