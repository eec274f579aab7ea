//! Provider orchestration layer for external service integrations
//!
//! Registers interchangeable providers for a capability category
//! (transactional email, SMS, video generation, text-to-speech) behind one
//! contract, selects the active one by priority and live health, retries
//! and fails over transparently, and records the telemetry needed to
//! answer which provider served a request, at what cost, and why it
//! switched.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod state;
pub mod traits;

// Re-export main types
pub use config::{ProviderBootstrap, ProviderSettings, SwitchboardConfig};
pub use crate::core::executor::{execute_with_policy, Execution, ExecutorError, RetryPolicy};
pub use crate::core::health::{CachedHealth, HealthMonitor, HealthMonitorConfig};
pub use crate::core::registry::{
    ProviderHealthView, ProviderRegistry, RegistryConfig, RotationOutcome,
};
pub use error::{LedgerError, SwitchboardError, SwitchboardResult};
pub use services::{
    ElevenLabsProvider, MailgunProvider, RealTransactionLedger, SendgridProvider, TwilioProvider,
};
pub use state::Switchboard;
pub use traits::{Provider, TransactionLedger, TransactionOutcome};
