use thiserror::Error;

use crate::retry::{classify_status, Classify, ErrorClass};

/// Longest error body kept in an error message.
const MAX_BODY_CHARS: usize = 200;

/// Errors returned by [`ApiClient`](super::ApiClient).
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was obtained (connect, reset, timeout).
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ApiError {
    /// Build a status error from a failed response body.
    ///
    /// Uses the `detail` field of a JSON error body when there is one.
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| match v.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            });
        let message = detail.unwrap_or_else(|| body.trim().chars().take(MAX_BODY_CHARS).collect());
        Self::Status { status, message }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Client(err.to_string())
        } else {
            Self::Network(err)
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The session token expired or was rejected; the user must log in again.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl Classify for ApiError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) => ErrorClass::Retryable,
            Self::Status { status, .. } => classify_status(*status),
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Decode(_) | Self::InvalidUrl(_) | Self::Client(_) => ErrorClass::Fatal,
        }
    }
}
