//! Contracts for dependency injection
//!
//! The registry depends only on these traits, never on concrete adapter or
//! storage types, so every capability category shares one orchestration
//! path and tests can substitute mocks.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::ProviderSettings;
use crate::error::{LedgerError, SwitchboardResult};
use shared::{
    Capability, CapabilityFlags, CostAlert, CredentialRotation, FailoverEvent, HealthProbe,
    HealthRecord, MonthlyCost, OperationOutcome, OperationRequest, PerformancePeriod,
    PeriodEndReason, ProviderAnalytics, ProviderFailure, ProviderHealthState, ProviderName,
    Transaction, TransactionId,
};

/// Terminal update applied to a pending transaction
///
/// Modeled as an enum so a finalized record can never be pushed back to
/// pending through this path.
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    Completed {
        cost_cents: u64,
        response_time_ms: u64,
        metadata: HashMap<String, serde_json::Value>,
    },
    Failed {
        error: String,
        response_time_ms: Option<u64>,
        metadata: HashMap<String, serde_json::Value>,
    },
}

/// Uniform contract every concrete provider implements
///
/// One implementation per back end (SendGrid, Twilio, ElevenLabs, ...);
/// the orchestrator treats all of them identically and never sees wire
/// formats.
#[mockall::automock]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry key, stable across restarts
    fn name(&self) -> &ProviderName;

    /// The capability category this provider serves
    fn capability(&self) -> Capability;

    /// Static feature/limit descriptor used for candidate filtering
    fn capabilities(&self) -> CapabilityFlags;

    /// Validate and store configuration; idempotent, merges with any
    /// previous settings. Fails with `Configuration` when the credential
    /// or a category-specific mandatory field is missing.
    async fn initialize(&self, settings: ProviderSettings) -> SwitchboardResult<()>;

    /// Category-specific liveness probe reduced to a uniform verdict.
    /// Never errors; probe failures resolve to an unhealthy verdict.
    async fn probe_health(&self) -> HealthProbe;

    /// Perform the category-specific action. Expected failures come back
    /// as `Err(ProviderFailure)`; calling before `initialize` is the one
    /// programmer error and surfaces as `InvalidRequest`.
    async fn execute(
        &self,
        request: &OperationRequest,
    ) -> Result<OperationOutcome, ProviderFailure>;
}

/// Durable record store for transactions, failovers, health history,
/// performance periods, cost alerts, and credential rotations
#[mockall::automock]
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Write-once create keyed by the caller-supplied id; a duplicate
    /// create is a no-op (first write wins)
    async fn create_transaction(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Move a pending transaction to a terminal state. Rejected once the
    /// record is terminal, so late completions of abandoned calls cannot
    /// corrupt it.
    async fn finalize_transaction(
        &self,
        id: &TransactionId,
        outcome: TransactionOutcome,
    ) -> Result<(), LedgerError>;

    /// Point a still-pending transaction at a different provider (used
    /// when the registry fails over mid-operation)
    async fn reassign_transaction(
        &self,
        id: &TransactionId,
        provider: &ProviderName,
    ) -> Result<(), LedgerError>;

    async fn transaction(&self, id: &TransactionId) -> Option<Transaction>;

    /// Append a probe result and refresh the provider's health projection
    async fn record_health_check(&self, record: HealthRecord);

    async fn provider_health(&self, provider: &ProviderName) -> Option<ProviderHealthState>;

    async fn record_failover(&self, event: FailoverEvent) -> Result<(), LedgerError>;

    async fn failover_events(&self) -> Vec<FailoverEvent>;

    /// Open a performance period; at most one open period per provider
    async fn open_period(
        &self,
        provider: &ProviderName,
        capability: Capability,
    ) -> Result<Uuid, LedgerError>;

    async fn close_period(
        &self,
        provider: &ProviderName,
        reason: PeriodEndReason,
    ) -> Result<(), LedgerError>;

    async fn periods(&self, provider: &ProviderName) -> Vec<PerformancePeriod>;

    /// Create an alert unless an unresolved one already covers this
    /// provider; returns the (possibly pre-existing) unresolved alert
    async fn create_cost_alert(
        &self,
        provider: &ProviderName,
        capability: Capability,
        threshold_cents: u64,
        accumulated_cents: u64,
    ) -> CostAlert;

    /// Compare this calendar month's accumulated cost against the
    /// threshold; creates an alert on crossing. Returns the alert when
    /// one was newly created.
    async fn check_cost_threshold(
        &self,
        provider: &ProviderName,
        capability: Capability,
        threshold_cents: u64,
    ) -> Option<CostAlert>;

    /// Explicit operator action; requires free-text notes
    async fn resolve_cost_alert(&self, id: Uuid, notes: &str) -> Result<(), LedgerError>;

    async fn cost_alerts(&self) -> Vec<CostAlert>;

    async fn record_credential_rotation(&self, provider: &ProviderName) -> Uuid;

    async fn mark_rotation_validated(&self, id: Uuid) -> Result<(), LedgerError>;

    async fn credential_rotations(&self, provider: &ProviderName) -> Vec<CredentialRotation>;

    /// Windowed aggregates; zeroed for providers with no activity
    async fn provider_analytics(
        &self,
        provider: &ProviderName,
        window_days: i64,
    ) -> ProviderAnalytics;

    /// Calendar-month cost rollup for trend reporting
    async fn provider_cost_by_month(&self, provider: &ProviderName) -> Vec<MonthlyCost>;
}
