//! Error types for the ingestion engine.
//!
//! Variants that carry transport text hold it already redacted; build them
//! through the constructors on each enum rather than directly.

use std::time::Duration;

use crate::redact::redact_token;

/// Decoding failures for a single frame or response body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("obs_st array too short: got {got}, want {want}")]
    FrameTooShort { got: usize, want: usize },

    #[error("parsing timestamp: {0}")]
    Timestamp(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("no observations in response")]
    NoObservations,
}

/// Failures that end one stream session and trigger a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("websocket dial failed: {0}")]
    Dial(String),

    #[error("invalid device_id {device_id:?}: {reason}")]
    InvalidDeviceId { device_id: String, reason: String },

    #[error("send listen_start: {0}")]
    Subscribe(String),

    #[error("read: {0}")]
    Read(String),

    #[error("read: no message within {0:?}")]
    ReadTimeout(Duration),

    #[error("connection closed by server")]
    Closed,

    /// Shutdown was signalled while the session was active.
    #[error("cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn dial(err: impl std::fmt::Display, token: &str) -> Self {
        StreamError::Dial(redact_token(&err.to_string(), token))
    }

    pub fn subscribe(err: impl std::fmt::Display, token: &str) -> Self {
        StreamError::Subscribe(redact_token(&err.to_string(), token))
    }

    pub fn read(err: impl std::fmt::Display, token: &str) -> Self {
        StreamError::Read(redact_token(&err.to_string(), token))
    }
}

/// Failures of a single REST fallback fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetching observations: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("decoding response: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    pub fn request(err: impl std::fmt::Display, token: &str) -> Self {
        FetchError::Request(redact_token(&err.to_string(), token))
    }

    pub fn status(status: u16, body: &str, token: &str) -> Self {
        FetchError::Status {
            status,
            body: redact_token(body, token),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
