//! Service worker error types.

use thiserror::Error;

/// Result alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;

/// Errors that can occur in service worker operations.
///
/// `Clone` so a single failure can be reported both to the caller and on
/// the registration's event channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Install failed while caching {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ServiceWorkerError {
    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Create a cache error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::CacheError(msg.into())
    }

    /// Whether the browser would retry the operation later on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::InstallFailed { .. })
    }
}

impl From<url::ParseError> for ServiceWorkerError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<souq_common::ConfigError> for ServiceWorkerError {
    fn from(err: souq_common::ConfigError) -> Self {
        Self::RegistrationFailed(err.to_string())
    }
}
