//! Switchboard error types

use shared::{Capability, ProviderFailure, TransactionId};
use thiserror::Error;
use uuid::Uuid;

/// Result type for switchboard operations
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;

/// Registry-level errors surfaced to callers
#[derive(Error, Debug)]
pub enum SwitchboardError {
    #[error("Provider configuration invalid: {message}")]
    Configuration { message: String },

    #[error("Unknown provider: {name}")]
    ProviderNotFound { name: String },

    #[error("Provider {name} is unhealthy and cannot be activated")]
    ProviderUnhealthy { name: String },

    #[error("No provider available for category {capability}")]
    NoProviderAvailable { capability: Capability },

    #[error("Operation failed after {attempts} attempt(s): {last}")]
    OperationFailed { attempts: u32, last: ProviderFailure },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Shared component error: {0}")]
    Shared(#[from] shared::SharedError),
}

/// Storage-level errors from the transaction ledger
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Transaction {id} is already finalized")]
    TerminalTransaction { id: TransactionId },

    #[error("Transaction {id} not found")]
    TransactionNotFound { id: TransactionId },

    #[error("Failover event must reference two distinct providers")]
    IdenticalFailoverProviders,

    #[error("Provider {name} already has an open performance period")]
    PeriodAlreadyOpen { name: String },

    #[error("No open performance period for provider {name}")]
    NoOpenPeriod { name: String },

    #[error("Cost alert {id} not found")]
    AlertNotFound { id: Uuid },

    #[error("Credential rotation {id} not found")]
    RotationNotFound { id: Uuid },
}
