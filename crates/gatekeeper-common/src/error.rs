//! Common error types for Gatekeeper components.

use thiserror::Error;

/// Common errors across Gatekeeper components
#[derive(Debug, Error)]
pub enum GatekeeperError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session store read/write error
    #[error("Session store error: {0}")]
    Store(String),

    /// Transient messaging platform failure (network, rate limit)
    #[error("Platform error: {0}")]
    Platform(String),

    /// The messaging platform refused the request
    #[error("Platform rejected request: {0}")]
    PlatformRejected(String),

    /// CAPTCHA generation/rendering error
    #[error("CAPTCHA error: {0}")]
    Captcha(String),

    /// Malformed callback token or deep-link payload
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl GatekeeperError {
    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Platform(_) | Self::Store(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for GatekeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("corrupt session record: {err}"))
    }
}
