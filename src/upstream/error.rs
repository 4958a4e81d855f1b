//! Upstream error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when calling the listings API
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request did not complete within the per-call timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// The upstream answered with an error status or error envelope
    #[error("upstream error {code}: {message}")]
    Api { code: i64, message: String },

    /// The response body matched neither envelope shape
    #[error("invalid upstream response: {0}")]
    Validation(String),

    /// Every attempt failed with a retryable error
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<UpstreamError>,
    },
}

impl UpstreamError {
    /// Whether another attempt may succeed
    ///
    /// Timeouts, network errors, 5xx and 429 are retryable; everything else,
    /// including any other 4xx and malformed bodies, is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) | UpstreamError::Network(_) => true,
            UpstreamError::Api { code, .. } => *code == 429 || (500..600).contains(code),
            UpstreamError::Validation(_) | UpstreamError::RetriesExhausted { .. } => false,
        }
    }

    /// Status-like code carried by the error, if any
    pub fn code(&self) -> Option<i64> {
        match self {
            UpstreamError::Api { code, .. } => Some(*code),
            UpstreamError::RetriesExhausted { last, .. } => last.code(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Validation(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}
