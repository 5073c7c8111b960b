//! Error types for image-guard.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Vision classifier errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("No classifier transport available (no direct endpoint configured and no fallback provider)")]
    Unavailable,

    #[error("Transport {transport} request failed: {reason}")]
    RequestFailed { transport: String, reason: String },

    #[error("Transport {transport} returned HTTP {status}: {body}")]
    HttpStatus {
        transport: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {transport}: {reason}")]
    InvalidResponse { transport: String, reason: String },
}

/// Errors from invoking an action on the messaging backend.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action {action} request failed: {reason}")]
    RequestFailed { action: String, reason: String },

    #[error("Action {action} rejected by backend (retcode {retcode}): {message}")]
    Rejected {
        action: String,
        retcode: i64,
        message: String,
    },

    #[error("Invalid response for action {action}: {reason}")]
    InvalidResponse { action: String, reason: String },

    #[error("Invalid parameter for action {action}: {reason}")]
    InvalidParameter { action: String, reason: String },
}

/// Errors converting backend payloads into events.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("Event is missing required field: {0}")]
    MissingField(String),
}

/// Event server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server terminated: {0}")]
    Serve(String),
}

/// Result type alias for image-guard.
pub type Result<T> = std::result::Result<T, Error>;
