//! Event server: receives OneBot HTTP posts and audits them.
//!
//! Each message post is audited on its own task; the handler replies `204`
//! immediately so the OneBot implementation never waits on the classifier.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::classifier::{VerdictClassifier, create_provider};
use crate::config::{GuardConfig, ServiceConfig};
use crate::error::{Result, ServerError};
use crate::event::ActionInvoker;
use crate::onebot::{OneBotHttpClient, OneBotPost, parse_post};
use crate::pipeline::AuditPipeline;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<AuditPipeline>,
    invoker: Arc<dyn ActionInvoker>,
}

/// Build the router.
pub fn event_routes(pipeline: Arc<AuditPipeline>, invoker: Arc<dyn ActionInvoker>) -> Router {
    let state = AppState { pipeline, invoker };

    Router::new()
        .route("/health", get(health))
        .route("/onebot/event", post(receive_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire classifier, OneBot client, and pipeline for `config`, then build the
/// router.
///
/// The service's own chat provider, when configured, backs the classifier
/// whenever the policy names no vision endpoint.
pub fn build_app(service: &ServiceConfig, config: GuardConfig) -> Result<Router> {
    let fallback = service
        .fallback_llm
        .as_ref()
        .map(create_provider)
        .transpose()?;
    let classifier = VerdictClassifier::from_config(&config.classifier, fallback)?;
    if !classifier.is_available() {
        warn!("No vision endpoint or fallback provider configured, audits will fail open");
    }

    let invoker: Arc<dyn ActionInvoker> = Arc::new(OneBotHttpClient::new(
        &service.onebot_api_url,
        service.onebot_access_token.clone(),
        service.onebot_timeout,
    )?);

    let pipeline = Arc::new(AuditPipeline::new(Arc::new(config), classifier));
    Ok(event_routes(pipeline, invoker))
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, app: Router) -> std::result::Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    info!(addr, "Event server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "image-guard"
    }))
}

async fn receive_event(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    let event = match parse_post(body) {
        Ok(OneBotPost::Message(event)) => event.with_invoker(Arc::clone(&state.invoker)),
        Ok(OneBotPost::Ignored { post_type }) => {
            debug!(post_type = %post_type, "Ignoring non-message post");
            return StatusCode::NO_CONTENT;
        }
        Err(e) => {
            warn!(error = %e, "Rejected malformed event");
            return StatusCode::BAD_REQUEST;
        }
    };

    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        let outcome = pipeline.process(&event).await;
        debug!(
            sender = %event.sender_id,
            outcome = outcome.label(),
            "Audit finished"
        );
    });

    StatusCode::NO_CONTENT
}
