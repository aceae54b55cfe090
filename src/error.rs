//! Error taxonomy
//!
//! Data-source failures are classified so callers can decide between
//! retrying, degrading, and skipping. Only configuration errors and an
//! exhausted reconnect budget ever stop the process.

use thiserror::Error;

/// Failure of one of the two data sources (indexing API or chain node).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Provider asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transport failure, timeout, or a 5xx from the provider.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Response could not be understood. Not retried.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The node does not (yet) know this block.
    #[error("block {0} not found")]
    BlockNotFound(u64),
}

impl SourceError {
    /// Returns `true` if the same call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => Self::RateLimited(err.to_string()),
            Some(status) if status.is_client_error() => Self::Malformed(err.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Startup-fatal configuration problem.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid watched address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("invalid {name} URL {input:?}")]
    InvalidUrl { name: &'static str, input: String },
}

/// Terminal engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("head subscription lost and {attempts} reconnect attempts failed (last error: {last})")]
    SubscriptionExhausted { attempts: u32, last: String },
}
