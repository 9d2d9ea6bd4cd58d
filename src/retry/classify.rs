//! Error classification shared by the retry executor and cancellation scopes.

/// HTTP statuses considered transient.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Likely transient (network failure, 408, 429, 5xx). Eligible for retry.
    Retryable,
    /// The server rejected the request, or the failure is local. Never retried.
    Fatal,
    /// The caller cancelled the operation. Not an error for the caller.
    Cancelled,
}

/// Errors that can tell the retry layer what kind of failure they are.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Cancelled
    }
}

/// Classify an HTTP status code of a failed response.
pub fn classify_status(status: u16) -> ErrorClass {
    if RETRYABLE_STATUSES.contains(&status) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}
