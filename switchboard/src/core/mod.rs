//! Core orchestration logic: resilient execution, health interpretation,
//! and the per-category provider registry

pub mod executor;
pub mod health;
pub mod registry;

pub use executor::{execute_with_policy, Execution, ExecutorError, RetryPolicy};
pub use health::{CachedHealth, HealthMonitor, HealthMonitorConfig};
pub use registry::{ProviderHealthView, ProviderRegistry, RegistryConfig, RotationOutcome};
