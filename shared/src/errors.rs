//! Shared error types and the provider failure taxonomy

use thiserror::Error;

/// Normalized failure from any provider back end
///
/// Adapters translate wire-level errors into this taxonomy before anything
/// reaches the registry; transport-class failures are the only ones the
/// resilient executor will retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("authentication failed (invalid or expired credential)")]
    AuthenticationFailed,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("request quota exceeded")]
    QuotaExceeded,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("request timed out")]
    Timeout,

    #[error("service temporarily unavailable")]
    ServiceUnavailable,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ProviderFailure {
    /// Transport-class failures are retryable; everything else (auth,
    /// quota, validation) is terminal on first occurrence.
    pub fn is_transport(&self) -> bool {
        match self {
            ProviderFailure::NetworkError(_)
            | ProviderFailure::Timeout
            | ProviderFailure::ServiceUnavailable => true,
            ProviderFailure::ServerError(message) | ProviderFailure::Unknown(message) => {
                let message = message.to_lowercase();
                message.contains("network")
                    || message.contains("connection refused")
                    || message.contains("connection reset")
                    || message.contains("dns")
                    || message.contains("timeout")
                    || message.contains("503")
            }
            _ => false,
        }
    }
}

/// Errors raised while parsing shared configuration values
#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid capability category: {input}")]
    InvalidCapability { input: String },

    #[error("Invalid priority value: {input}")]
    InvalidPriority { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
