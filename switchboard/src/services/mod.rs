//! Service implementations: the ledger and the bundled provider adapters

pub mod email;
pub mod ledger;
pub mod sms;
pub mod speech;

#[cfg(test)]
pub mod tests;

pub use email::{MailgunProvider, SendgridProvider};
pub use ledger::RealTransactionLedger;
pub use sms::TwilioProvider;
pub use speech::ElevenLabsProvider;

use shared::ProviderFailure;

/// Map an HTTP status from any back end into the shared failure taxonomy
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderFailure {
    match status.as_u16() {
        401 | 403 => ProviderFailure::AuthenticationFailed,
        402 => ProviderFailure::QuotaExceeded,
        429 => ProviderFailure::RateLimitExceeded,
        400 | 404 | 413 | 422 => ProviderFailure::InvalidRequest(format!("{status}: {body}")),
        503 => ProviderFailure::ServiceUnavailable,
        500..=599 => ProviderFailure::ServerError(status.to_string()),
        _ => ProviderFailure::Unknown(format!("{status}: {body}")),
    }
}

/// Map a reqwest transport error into the shared failure taxonomy
pub(crate) fn classify_transport(error: reqwest::Error) -> ProviderFailure {
    if error.is_timeout() {
        ProviderFailure::Timeout
    } else {
        ProviderFailure::NetworkError(error.to_string())
    }
}
