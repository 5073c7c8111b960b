//! Configuration types.
//!
//! `GuardConfig` is the moderation policy. It is loaded once at startup from a
//! JSON file (plus a few environment overrides for secrets) and shared
//! read-only as `Arc<GuardConfig>`. `ServiceConfig` holds process wiring and is
//! read from the environment only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::event::json_id;

/// Scope entry that matches every group or user.
pub const SCOPE_WILDCARD: &str = "0";

/// Default mute duration: one day.
const DEFAULT_BAN_DURATION_SECS: i64 = 86_400;

/// Moderation policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Groups under audit. `"0"` audits every group.
    #[serde(deserialize_with = "id_list")]
    pub group_scope: Vec<String>,
    /// Private-chat users under audit. `"0"` audits every user.
    #[serde(deserialize_with = "id_list")]
    pub private_scope: Vec<String>,
    /// Fraction of eligible messages that are sent to the classifier.
    pub check_probability: f64,
    /// Text that must not appear in images.
    pub sensitive_texts: Vec<String>,
    /// Descriptions of forbidden imagery.
    pub forbidden_descriptions: Vec<String>,
    /// Extra instruction injected into the moderation prompt.
    pub custom_vision_prompt: String,
    /// Independent vision endpoint credentials.
    #[serde(flatten)]
    pub classifier: ClassifierConfig,
    /// Recall the offending message in groups.
    pub enable_recall: bool,
    /// Mute duration in seconds. Zero disables muting.
    pub ban_duration: i64,
    /// User id that receives private evidence reports.
    #[serde(deserialize_with = "optional_id")]
    pub report_target_id: Option<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            group_scope: vec![SCOPE_WILDCARD.to_string()],
            private_scope: Vec::new(),
            check_probability: 1.0,
            sensitive_texts: Vec::new(),
            forbidden_descriptions: Vec::new(),
            custom_vision_prompt: String::new(),
            classifier: ClassifierConfig::default(),
            enable_recall: true,
            ban_duration: DEFAULT_BAN_DURATION_SECS,
            report_target_id: None,
        }
    }
}

impl GuardConfig {
    /// Parse a policy from JSON text. Missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.ban_duration < 0 {
            return Err(ConfigError::InvalidValue {
                key: "ban_duration".into(),
                message: format!("must be >= 0, got {}", config.ban_duration),
            });
        }
        Ok(config.normalized())
    }

    /// Load the policy file, then apply environment overrides.
    ///
    /// A missing file is not an error: the defaults are used so the service
    /// can run purely from environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "Loaded moderation config");
                Self::from_json(&text)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay classifier credentials and the report target from a key lookup
    /// (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("IMAGE_GUARD_LLM_API_KEY") {
            self.classifier.api_key = Some(SecretString::from(key));
        }
        if let Some(url) = lookup("IMAGE_GUARD_LLM_BASE_URL") {
            self.classifier.base_url = Some(url);
        }
        if let Some(model) = lookup("IMAGE_GUARD_LLM_MODEL") {
            self.classifier.model = Some(model);
        }
        if let Some(target) = lookup("IMAGE_GUARD_REPORT_TARGET") {
            self.report_target_id = Some(target.trim().to_string());
        }
    }

    fn normalized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.check_probability) {
            let clamped = if self.check_probability.is_nan() {
                1.0
            } else {
                self.check_probability.clamp(0.0, 1.0)
            };
            warn!(
                configured = self.check_probability,
                clamped, "check_probability out of range, clamping"
            );
            self.check_probability = clamped;
        }
        self
    }
}

/// Credentials for the independent vision endpoint.
///
/// Both `api_key` and `base_url` must be present to use the direct transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    #[serde(rename = "llm_api_key", deserialize_with = "optional_secret")]
    pub api_key: Option<SecretString>,
    #[serde(rename = "llm_base_url", deserialize_with = "optional_string")]
    pub base_url: Option<String>,
    #[serde(rename = "llm_model", deserialize_with = "optional_string")]
    pub model: Option<String>,
}

impl ClassifierConfig {
    /// Whether the direct HTTP transport can be used.
    pub fn has_direct_endpoint(&self) -> bool {
        self.api_key.is_some() && self.base_url.is_some()
    }
}

/// Process wiring read from the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the event server listens on.
    pub bind_addr: String,
    /// Path to the moderation policy JSON.
    pub config_path: PathBuf,
    /// Base URL of the OneBot HTTP API.
    pub onebot_api_url: String,
    /// Optional OneBot access token.
    pub onebot_access_token: Option<SecretString>,
    /// Timeout for each OneBot action call.
    pub onebot_timeout: Duration,
    /// Directory for rolling log files. Stdout only when unset.
    pub log_dir: Option<PathBuf>,
    /// Service-wide chat model used when the policy has no vision endpoint.
    pub fallback_llm: Option<LlmConfig>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("IMAGE_GUARD_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let config_path = std::env::var("IMAGE_GUARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./image_guard.json"));

        let onebot_api_url = std::env::var("ONEBOT_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5700".to_string());

        let onebot_access_token = std::env::var("ONEBOT_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        let onebot_timeout_secs: u64 = std::env::var("ONEBOT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let log_dir = std::env::var("IMAGE_GUARD_LOG_DIR").ok().map(PathBuf::from);

        let fallback_llm = LlmConfig::from_lookup(|key| std::env::var(key).ok());

        Self {
            bind_addr,
            config_path,
            onebot_api_url,
            onebot_access_token,
            onebot_timeout: Duration::from_secs(onebot_timeout_secs),
            log_dir,
            fallback_llm,
        }
    }
}

/// Supported chat backends for the fallback provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Model used when `IMAGE_GUARD_PROVIDER_MODEL` is unset.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }

    fn key_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn base_url_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_BASE_URL",
            Self::OpenAi => "OPENAI_BASE_URL",
        }
    }
}

/// Configuration for the service's own chat provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    /// Override for the backend's public API root.
    pub base_url: Option<String>,
}

impl LlmConfig {
    /// Read the fallback provider from a key lookup.
    ///
    /// `IMAGE_GUARD_PROVIDER` picks the backend (`openai` by default). Returns
    /// `None` when the backend's API key is missing or the backend is unknown.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend = match lookup("IMAGE_GUARD_PROVIDER").as_deref() {
            None => LlmBackend::OpenAi,
            Some(name) if name.eq_ignore_ascii_case("openai") => LlmBackend::OpenAi,
            Some(name) if name.eq_ignore_ascii_case("anthropic") => LlmBackend::Anthropic,
            Some(other) => {
                warn!(provider = other, "Unknown IMAGE_GUARD_PROVIDER, fallback provider disabled");
                return None;
            }
        };

        let api_key = lookup(backend.key_var())?;
        Some(Self {
            backend,
            api_key: SecretString::from(api_key),
            model: lookup("IMAGE_GUARD_PROVIDER_MODEL")
                .unwrap_or_else(|| backend.default_model().to_string()),
            base_url: lookup(backend.base_url_var()),
        })
    }
}

// ── Deserialization helpers ─────────────────────────────────────────

fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(values.iter().filter_map(json_id).collect())
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(json_id))
}

fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string(deserializer)?.map(SecretString::from))
}
