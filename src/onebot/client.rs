//! OneBot HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ActionError;
use crate::event::ActionInvoker;

/// Invokes actions via `POST {api_base}/{action}`.
pub struct OneBotHttpClient {
    api_base: String,
    access_token: Option<SecretString>,
    client: reqwest::Client,
}

/// Standard OneBot action response envelope.
#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    wording: Option<String>,
}

impl OneBotHttpClient {
    pub fn new(
        api_base: &str,
        access_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActionError::RequestFailed {
                action: "client".into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
            client,
        })
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/{action}", self.api_base)
    }
}

#[async_trait]
impl ActionInvoker for OneBotHttpClient {
    async fn call_action(&self, action: &str, params: Value) -> Result<Value, ActionError> {
        let mut request = self.client.post(self.action_url(action)).json(&params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ActionError::RequestFailed {
                action: action.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActionError::RequestFailed {
                action: action.to_string(),
                reason: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            });
        }

        let envelope: ActionResponse =
            resp.json()
                .await
                .map_err(|e| ActionError::InvalidResponse {
                    action: action.to_string(),
                    reason: e.to_string(),
                })?;

        if envelope.status == "ok" || (envelope.status.is_empty() && envelope.retcode == 0) {
            tracing::debug!(action, "OneBot action succeeded");
            return Ok(envelope.data);
        }

        Err(ActionError::Rejected {
            action: action.to_string(),
            retcode: envelope.retcode,
            message: envelope
                .wording
                .or(envelope.message)
                .unwrap_or_else(|| envelope.status.clone()),
        })
    }
}
