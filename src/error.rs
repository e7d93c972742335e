//! Crate-level error types.
//!
//! [`TvFeedError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, file export) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator for easy
//! propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TvFeedError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum TvFeedError {
    /// An environment variable held an unsupported value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP lookup against one of the vendor REST endpoints failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing an export file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller input was rejected before any network I/O.
    #[error("{0}")]
    Validation(String),

    /// A vendor payload was missing a required field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}
