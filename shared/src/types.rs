//! Core shared types and identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Capability category served by interchangeable external providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Email,
    Sms,
    Video,
    Speech,
}

impl Capability {
    /// All categories the platform integrates with
    pub const ALL: [Capability; 4] = [
        Capability::Email,
        Capability::Sms,
        Capability::Video,
        Capability::Speech,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Email => "email",
            Capability::Sms => "sms",
            Capability::Video => "video",
            Capability::Speech => "speech",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email" => Some(Capability::Email),
            "sms" => Some(Capability::Sms),
            "video" => Some(Capability::Video),
            "speech" | "tts" => Some(Capability::Speech),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registry key for a concrete provider (e.g. "sendgrid", "twilio")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderName(String);

impl ProviderName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Caller-generated identifier for one logical operation
///
/// Supplied by the caller rather than minted by the ledger so that retries
/// across process restarts remain idempotent-identifiable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selection status of a registered provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Currently selected to serve new operations for its category
    Active,
    /// Registered but not selected
    Inactive,
    /// Still nominally selected but failing health probes, pending failover
    Degraded,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Active => write!(f, "active"),
            ProviderStatus::Inactive => write!(f, "inactive"),
            ProviderStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Feature and limit descriptor the registry uses to filter candidates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub supports_bulk: bool,
    pub supports_attachments: bool,
    /// None means no declared limit
    pub max_payload_bytes: Option<u64>,
}

impl CapabilityFlags {
    /// Whether this descriptor covers everything `required` asks for
    pub fn satisfies(&self, required: &CapabilityFlags) -> bool {
        if required.supports_bulk && !self.supports_bulk {
            return false;
        }
        if required.supports_attachments && !self.supports_attachments {
            return false;
        }
        match (required.max_payload_bytes, self.max_payload_bytes) {
            (Some(needed), Some(limit)) => limit >= needed,
            _ => true,
        }
    }
}

/// Ephemeral request for one provider operation
///
/// The payload is category-specific and opaque to the registry; adapters
/// pull out the fields they need (recipient, subject, text, voice id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub payload: serde_json::Value,
    pub entity_type: String,
    pub entity_id: String,
    pub caller_ref: Option<String>,
}

impl OperationRequest {
    pub fn new(payload: serde_json::Value, entity_type: &str, entity_id: &str) -> Self {
        Self {
            payload,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            caller_ref: None,
        }
    }
}

/// Normalized success payload from a provider operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub provider_message_id: Option<String>,
    pub cost_cents: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Result of one health probe, before TTL/hysteresis interpretation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProbe {
    pub healthy: bool,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl HealthProbe {
    pub fn up(response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }
}

/// Durable record of one logical operation against a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub provider: ProviderName,
    pub capability: Capability,
    pub entity_type: String,
    pub entity_id: String,
    pub status: TransactionStatus,
    /// Smallest currency unit (cents)
    pub cost_cents: u64,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A fresh pending record, created the moment an operation starts
    pub fn pending(
        id: TransactionId,
        provider: ProviderName,
        capability: Capability,
        entity_type: &str,
        entity_id: &str,
    ) -> Self {
        Self {
            id,
            provider,
            capability,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            status: TransactionStatus::Pending,
            cost_cents: 0,
            response_time_ms: None,
            error: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Why the registry switched active providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverReason {
    HealthFailure,
    OperationFailure,
}

impl FailoverReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverReason::HealthFailure => "health_failure",
            FailoverReason::OperationFailure => "operation_failure",
        }
    }
}

impl fmt::Display for FailoverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one active-provider switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub id: Uuid,
    /// The operation that triggered the switch; None for health-driven
    /// reselection outside any operation
    pub transaction_id: Option<TransactionId>,
    pub capability: Capability,
    pub from_provider: ProviderName,
    pub to_provider: ProviderName,
    pub reason: FailoverReason,
    pub occurred_at: DateTime<Utc>,
}

/// Point-in-time probe result, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub provider: ProviderName,
    pub healthy: bool,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Projection of recent health records, kept current by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthState {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub error_count: u64,
    pub checks_total: u64,
    pub average_response_time_ms: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ProviderHealthState {
    fn default() -> Self {
        Self {
            healthy: false,
            consecutive_failures: 0,
            error_count: 0,
            checks_total: 0,
            average_response_time_ms: 0,
            last_success: None,
            last_failure: None,
            last_checked: None,
        }
    }
}

/// Why a performance period was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodEndReason {
    Deactivated,
    ReplacedByHigherPriority,
    HealthFailure,
    OperationFailure,
}

impl PeriodEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodEndReason::Deactivated => "deactivated",
            PeriodEndReason::ReplacedByHigherPriority => "replaced_by_higher_priority",
            PeriodEndReason::HealthFailure => "health_failure",
            PeriodEndReason::OperationFailure => "operation_failure",
        }
    }
}

/// Bounded window over which a provider's aggregate metrics are computed
///
/// Opened when a provider becomes active, closed when the bounding
/// condition occurs. At most one open period per provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePeriod {
    pub id: Uuid,
    pub provider: ProviderName,
    pub capability: Capability,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<PeriodEndReason>,
    pub requests: u64,
    pub successes: u64,
    pub cost_cents: u64,
}

impl PerformancePeriod {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64
        }
    }
}

/// Raised when accumulated cost crosses a configured threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAlert {
    pub id: Uuid,
    pub provider: ProviderName,
    pub capability: Capability,
    pub threshold_cents: u64,
    pub accumulated_cents: u64,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Immutable log entry for a credential change
///
/// Never stores credential material; `validated` flips once the new
/// credential passes a health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRotation {
    pub id: Uuid,
    pub provider: ProviderName,
    pub rotated_at: DateTime<Utc>,
    pub validated: bool,
}

/// Windowed aggregates answering "which provider, at what cost, and why"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAnalytics {
    pub provider: ProviderName,
    pub window_days: i64,
    pub total_requests: u64,
    /// completed / total; 0.0 when there were no requests
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub total_cost_cents: u64,
    /// Failovers this provider was the origin of
    pub failover_count: u64,
    /// healthy probes / total probes; 0.0 when there were no probes
    pub health_uptime: f64,
}

impl ProviderAnalytics {
    /// Zeroed aggregates for a provider with no recorded activity
    pub fn zeroed(provider: ProviderName, window_days: i64) -> Self {
        Self {
            provider,
            window_days,
            total_requests: 0,
            success_rate: 0.0,
            average_response_time_ms: 0.0,
            total_cost_cents: 0,
            failover_count: 0,
            health_uptime: 0.0,
        }
    }
}

/// Calendar-month cost rollup entry ("2025-07" style keys)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCost {
    pub month: String,
    pub cost_cents: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::parse(capability.as_str()), Some(capability));
        }
        assert_eq!(Capability::parse("tts"), Some(Capability::Speech));
        assert_eq!(Capability::parse("fax"), None);
    }

    #[test]
    fn test_capability_flags_satisfies() {
        let full = CapabilityFlags {
            supports_bulk: true,
            supports_attachments: true,
            max_payload_bytes: Some(30_000_000),
        };
        let needs_bulk = CapabilityFlags {
            supports_bulk: true,
            ..Default::default()
        };
        let needs_large_payload = CapabilityFlags {
            max_payload_bytes: Some(50_000_000),
            ..Default::default()
        };

        assert!(full.satisfies(&needs_bulk));
        assert!(full.satisfies(&CapabilityFlags::default()));
        assert!(!full.satisfies(&needs_large_payload));

        let minimal = CapabilityFlags::default();
        assert!(!minimal.satisfies(&needs_bulk));
        // No declared limit means any payload size is acceptable
        assert!(minimal.satisfies(&needs_large_payload));
    }

    #[test]
    fn test_transaction_status_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_period_success_rate_zero_requests() {
        let period = PerformancePeriod {
            id: Uuid::new_v4(),
            provider: ProviderName::from("sendgrid"),
            capability: Capability::Email,
            started_at: Utc::now(),
            ended_at: None,
            end_reason: None,
            requests: 0,
            successes: 0,
            cost_cents: 0,
        };
        assert_eq!(period.success_rate(), 0.0);
    }
}
