//! Connector error types.

use thiserror::Error;

/// Errors from marketplace/ERP/webhook calls.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The remote applied rate limiting (HTTP 429).
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The remote rejected the call.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Authentication against the remote failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The response body did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The remote RPC reported a fault (ERP-side exception).
    #[error("RPC fault: {0}")]
    Rpc(String),
}

impl ConnectorError {
    /// True for failures worth retrying with backoff: rate limits,
    /// transport errors and server-side 5xx. Client errors and RPC
    /// faults are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::RateLimited { .. } => true,
            ConnectorError::Transport(_) => true,
            ConnectorError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;
