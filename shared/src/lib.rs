//! Shared vocabulary for the provider orchestration layer
//!
//! Contains only the types that cross the registry boundary: upstream
//! request handlers see them through the switchboard API, provider
//! adapters produce them, and the ledger persists them. Adapter-internal
//! types (wire payloads, endpoint paths) stay in their own modules.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
