//! Per-category provider registry with priority selection and failover
//!
//! One registry instance exists per capability category, constructed at
//! startup and passed by reference to callers. Providers are ordered by
//! ascending priority; exactly one may be active at an instant. The
//! failover transition (close period, select next, open period, write
//! event) runs under a per-category mutex so two concurrent failures can
//! never elect two different replacements.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::ProviderSettings;
use crate::core::executor::{execute_with_policy, ExecutorError, RetryPolicy};
use crate::core::health::HealthMonitor;
use crate::error::{LedgerError, SwitchboardError, SwitchboardResult};
use crate::traits::{Provider, TransactionLedger, TransactionOutcome};
use shared::{
    Capability, CapabilityFlags, FailoverEvent, FailoverReason, OperationOutcome,
    OperationRequest, PeriodEndReason, ProviderName, ProviderStatus, Transaction, TransactionId,
};

/// Registry tuning, shared by every provider in the category
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub default_retry: RetryPolicy,
    /// Terminal failures in a row before a provider is failed away from
    pub consecutive_failure_threshold: u32,
    /// Monthly cost threshold for alerting; None disables the check
    pub cost_alert_threshold_cents: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryPolicy::default(),
            consecutive_failure_threshold: 5,
            cost_alert_threshold_cents: None,
        }
    }
}

struct RegisteredProvider {
    provider: Arc<dyn Provider>,
    priority: u8,
    retry: RetryPolicy,
}

struct RegistryState {
    /// Index into `providers`; None when the category has no active provider
    active: Option<usize>,
    statuses: Vec<ProviderStatus>,
    consecutive_terminal_failures: Vec<u32>,
}

/// Operator-facing view of one registered provider
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealthView {
    pub name: ProviderName,
    pub priority: u8,
    pub status: ProviderStatus,
    /// None until the first probe has run
    pub healthy: Option<bool>,
}

/// Result of a credential rotation attempt
#[derive(Debug, Clone, serde::Serialize)]
pub struct RotationOutcome {
    pub rotation_id: Uuid,
    pub validated: bool,
}

pub struct ProviderRegistry {
    capability: Capability,
    /// Sorted by ascending priority at registration time; fixed afterwards
    providers: Vec<RegisteredProvider>,
    state: RwLock<RegistryState>,
    /// Serializes the failover transition for this category
    failover_lock: Mutex<()>,
    monitor: Arc<HealthMonitor>,
    ledger: Arc<dyn TransactionLedger>,
    config: RegistryConfig,
}

impl ProviderRegistry {
    pub fn new(
        capability: Capability,
        ledger: Arc<dyn TransactionLedger>,
        monitor: Arc<HealthMonitor>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            capability,
            providers: Vec::new(),
            state: RwLock::new(RegistryState {
                active: None,
                statuses: Vec::new(),
                consecutive_terminal_failures: Vec::new(),
            }),
            failover_lock: Mutex::new(()),
            monitor,
            ledger,
            config,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Register a provider before the registry goes into service.
    /// Providers with equal priority keep registration order.
    pub fn register(
        &mut self,
        provider: Arc<dyn Provider>,
        priority: u8,
        retry: Option<RetryPolicy>,
    ) {
        let retry = retry.unwrap_or_else(|| self.config.default_retry.clone());
        let position = self
            .providers
            .iter()
            .position(|registered| registered.priority > priority)
            .unwrap_or(self.providers.len());
        self.providers.insert(
            position,
            RegisteredProvider {
                provider,
                priority,
                retry,
            },
        );

        let state = self.state.get_mut();
        state.statuses.insert(position, ProviderStatus::Inactive);
        state.consecutive_terminal_failures.insert(position, 0);
    }

    /// Select the first healthy provider by priority as active
    ///
    /// Idempotent: returns the current active if one is already selected.
    /// With zero healthy providers the registry stays without an active
    /// provider and callers get `NoProviderAvailable`.
    pub async fn activate_initial(&self) -> SwitchboardResult<ProviderName> {
        let _guard = self.failover_lock.lock().await;

        if let Some(idx) = self.state.read().await.active {
            return Ok(self.providers[idx].provider.name().clone());
        }

        for (idx, registered) in self.providers.iter().enumerate() {
            if self.monitor.is_healthy(&registered.provider).await {
                let name = registered.provider.name().clone();
                {
                    let mut state = self.state.write().await;
                    state.active = Some(idx);
                    state.statuses[idx] = ProviderStatus::Active;
                }
                self.open_period_logged(&name).await;
                tracing::info!(
                    capability = %self.capability,
                    provider = %name,
                    priority = registered.priority,
                    "provider activated"
                );
                return Ok(name);
            }
        }

        tracing::warn!(capability = %self.capability, "no healthy provider to activate");
        Err(SwitchboardError::NoProviderAvailable {
            capability: self.capability,
        })
    }

    /// Atomic snapshot of the currently active provider
    pub async fn active_provider(&self) -> Option<Arc<dyn Provider>> {
        let state = self.state.read().await;
        state.active.map(|idx| self.providers[idx].provider.clone())
    }

    pub async fn active_provider_name(&self) -> Option<ProviderName> {
        let state = self.state.read().await;
        state
            .active
            .map(|idx| self.providers[idx].provider.name().clone())
    }

    /// Current status and last-known health of every registered provider
    pub async fn provider_health(&self) -> Vec<ProviderHealthView> {
        let state = self.state.read().await;
        let mut views = Vec::with_capacity(self.providers.len());
        for (idx, registered) in self.providers.iter().enumerate() {
            let name = registered.provider.name().clone();
            let healthy = self.monitor.cached(&name).await.map(|cached| cached.healthy);
            views.push(ProviderHealthView {
                name,
                priority: registered.priority,
                status: state.statuses[idx],
                healthy,
            });
        }
        views
    }

    /// First healthy provider that satisfies `required`, active first
    ///
    /// Returning a fallback here does not change the active provider;
    /// `set_active_provider` is the deliberate way to switch.
    pub async fn provider_with_capability(
        &self,
        required: &CapabilityFlags,
    ) -> SwitchboardResult<Arc<dyn Provider>> {
        let active = self.state.read().await.active;

        if let Some(idx) = active {
            let registered = &self.providers[idx];
            if registered.provider.capabilities().satisfies(required)
                && self.monitor.is_healthy(&registered.provider).await
            {
                return Ok(registered.provider.clone());
            }
        }

        for (idx, registered) in self.providers.iter().enumerate() {
            if Some(idx) == active {
                continue;
            }
            if registered.provider.capabilities().satisfies(required)
                && self.monitor.is_healthy(&registered.provider).await
            {
                return Ok(registered.provider.clone());
            }
        }

        Err(SwitchboardError::NoProviderAvailable {
            capability: self.capability,
        })
    }

    /// Manual override; succeeds only if the provider probes healthy now
    pub async fn set_active_provider(&self, name: &ProviderName) -> SwitchboardResult<()> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| SwitchboardError::ProviderNotFound {
                name: name.to_string(),
            })?;

        // Fresh probe at call time, not a cached verdict
        if !self.monitor.refresh(&self.providers[idx].provider).await {
            return Err(SwitchboardError::ProviderUnhealthy {
                name: name.to_string(),
            });
        }

        let _guard = self.failover_lock.lock().await;

        let previous = self.state.read().await.active;
        if previous == Some(idx) {
            return Ok(());
        }

        if let Some(prev_idx) = previous {
            let prev_name = self.providers[prev_idx].provider.name().clone();
            let reason = if self.providers[idx].priority < self.providers[prev_idx].priority {
                PeriodEndReason::ReplacedByHigherPriority
            } else {
                PeriodEndReason::Deactivated
            };
            self.close_period_logged(&prev_name, reason).await;
        }

        {
            let mut state = self.state.write().await;
            if let Some(prev_idx) = state.active {
                state.statuses[prev_idx] = ProviderStatus::Inactive;
            }
            state.active = Some(idx);
            state.statuses[idx] = ProviderStatus::Active;
            state.consecutive_terminal_failures[idx] = 0;
        }

        self.open_period_logged(name).await;
        tracing::info!(
            capability = %self.capability,
            provider = %name,
            "active provider set manually"
        );
        Ok(())
    }

    /// Execute one logical operation through the active provider
    ///
    /// The transaction id is caller-generated. On exhausted retries the
    /// registry fails over and continues down the priority list; the
    /// caller sees either one outcome or one terminal error, never a
    /// per-provider cascade.
    pub async fn execute(
        &self,
        id: TransactionId,
        request: &OperationRequest,
    ) -> SwitchboardResult<OperationOutcome> {
        let mut tried: HashSet<usize> = HashSet::new();

        let mut current = match self.current_or_activate().await {
            Some(idx) => idx,
            None => {
                return Err(SwitchboardError::NoProviderAvailable {
                    capability: self.capability,
                })
            }
        };

        self.ledger
            .create_transaction(Transaction::pending(
                id.clone(),
                self.providers[current].provider.name().clone(),
                self.capability,
                &request.entity_type,
                &request.entity_id,
            ))
            .await?;

        loop {
            let registered = &self.providers[current];
            tried.insert(current);

            match execute_with_policy(&registered.retry, || registered.provider.execute(request))
                .await
            {
                Ok(execution) => {
                    {
                        let mut state = self.state.write().await;
                        state.consecutive_terminal_failures[current] = 0;
                    }

                    let outcome = execution.value;
                    let mut metadata = outcome.metadata.clone();
                    metadata.insert("attempts".to_string(), serde_json::json!(execution.attempts));

                    self.ledger
                        .finalize_transaction(
                            &id,
                            TransactionOutcome::Completed {
                                cost_cents: outcome.cost_cents,
                                response_time_ms: execution.elapsed.as_millis() as u64,
                                metadata,
                            },
                        )
                        .await?;

                    if let Some(threshold) = self.config.cost_alert_threshold_cents {
                        if let Some(alert) = self
                            .ledger
                            .check_cost_threshold(
                                registered.provider.name(),
                                self.capability,
                                threshold,
                            )
                            .await
                        {
                            tracing::warn!(
                                provider = %alert.provider,
                                accumulated_cents = alert.accumulated_cents,
                                threshold_cents = alert.threshold_cents,
                                "monthly cost threshold crossed"
                            );
                        }
                    }

                    return Ok(outcome);
                }
                Err(ExecutorError::Terminal { failure }) => {
                    // Terminal errors surface immediately; they only cost
                    // the provider its active slot when they keep recurring
                    let crossed = {
                        let mut state = self.state.write().await;
                        state.consecutive_terminal_failures[current] += 1;
                        state.consecutive_terminal_failures[current]
                            >= self.config.consecutive_failure_threshold
                    };

                    self.ledger
                        .finalize_transaction(
                            &id,
                            TransactionOutcome::Failed {
                                error: failure.to_string(),
                                response_time_ms: None,
                                metadata: std::collections::HashMap::from([(
                                    "attempts".to_string(),
                                    serde_json::json!(1),
                                )]),
                            },
                        )
                        .await?;

                    if crossed {
                        tracing::warn!(
                            provider = %registered.provider.name(),
                            threshold = self.config.consecutive_failure_threshold,
                            "terminal failures crossed threshold, failing over"
                        );
                        let _ = self
                            .fail_over(current, FailoverReason::OperationFailure, Some(&id), &tried)
                            .await;
                    }

                    return Err(SwitchboardError::OperationFailed {
                        attempts: 1,
                        last: failure,
                    });
                }
                Err(ExecutorError::RetriesExhausted { attempts, last }) => {
                    tracing::warn!(
                        provider = %registered.provider.name(),
                        attempts,
                        error = %last,
                        "retries exhausted, attempting failover"
                    );

                    match self
                        .fail_over(current, FailoverReason::OperationFailure, Some(&id), &tried)
                        .await
                    {
                        Some(next) => {
                            self.ledger
                                .reassign_transaction(
                                    &id,
                                    self.providers[next].provider.name(),
                                )
                                .await?;
                            current = next;
                        }
                        None => {
                            self.ledger
                                .finalize_transaction(
                                    &id,
                                    TransactionOutcome::Failed {
                                        error: format!(
                                            "all providers exhausted, last error after {attempts} attempts: {last}"
                                        ),
                                        response_time_ms: None,
                                        metadata: std::collections::HashMap::new(),
                                    },
                                )
                                .await?;
                            return Err(SwitchboardError::NoProviderAvailable {
                                capability: self.capability,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Probe every provider; a failed probe on the active one marks it
    /// degraded and triggers failover. Re-elects when the category has no
    /// active provider but a healthy candidate exists.
    pub async fn check_health(&self) {
        let active = self.state.read().await.active;

        for (idx, registered) in self.providers.iter().enumerate() {
            let healthy = self.monitor.refresh(&registered.provider).await;
            if !healthy && Some(idx) == active {
                {
                    let mut state = self.state.write().await;
                    if state.active == Some(idx) {
                        state.statuses[idx] = ProviderStatus::Degraded;
                    }
                }
                tracing::warn!(
                    capability = %self.capability,
                    provider = %registered.provider.name(),
                    "active provider failed health probe"
                );
                let _ = self
                    .fail_over(idx, FailoverReason::HealthFailure, None, &HashSet::new())
                    .await;
            }
        }

        if self.state.read().await.active.is_none() {
            let _ = self.activate_initial().await;
        }
    }

    /// Re-initialize a provider with new credentials and validate them
    /// with a fresh probe; the rotation is logged either way
    pub async fn rotate_credential(
        &self,
        name: &ProviderName,
        settings: ProviderSettings,
    ) -> SwitchboardResult<RotationOutcome> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| SwitchboardError::ProviderNotFound {
                name: name.to_string(),
            })?;

        let rotation_id = self.ledger.record_credential_rotation(name).await;

        self.providers[idx].provider.initialize(settings).await?;
        self.monitor.invalidate(name).await;
        let validated = self.monitor.refresh(&self.providers[idx].provider).await;

        if validated {
            self.ledger.mark_rotation_validated(rotation_id).await?;
            tracing::info!(provider = %name, "rotated credential validated");
        } else {
            tracing::warn!(provider = %name, "rotated credential failed validation probe");
        }

        Ok(RotationOutcome {
            rotation_id,
            validated,
        })
    }

    fn index_of(&self, name: &ProviderName) -> Option<usize> {
        self.providers
            .iter()
            .position(|registered| registered.provider.name() == name)
    }

    async fn current_or_activate(&self) -> Option<usize> {
        if let Some(idx) = self.state.read().await.active {
            return Some(idx);
        }
        if self.activate_initial().await.is_err() {
            return None;
        }
        self.state.read().await.active
    }

    /// The failover transition, serialized per category: close the failed
    /// provider's period, select the next eligible by priority and health,
    /// open its period, and record the event.
    async fn fail_over(
        &self,
        from_idx: usize,
        reason: FailoverReason,
        transaction: Option<&TransactionId>,
        tried: &HashSet<usize>,
    ) -> Option<usize> {
        let _guard = self.failover_lock.lock().await;

        // A concurrent failure may already have moved the category on;
        // reuse its choice instead of switching twice
        {
            let state = self.state.read().await;
            if let Some(active) = state.active {
                if active != from_idx && !tried.contains(&active) {
                    return Some(active);
                }
            }
        }

        let from_name = self.providers[from_idx].provider.name().clone();
        let end_reason = match reason {
            FailoverReason::HealthFailure => PeriodEndReason::HealthFailure,
            FailoverReason::OperationFailure => PeriodEndReason::OperationFailure,
        };
        self.close_period_logged(&from_name, end_reason).await;

        {
            let mut state = self.state.write().await;
            if state.active == Some(from_idx) {
                state.active = None;
            }
            state.statuses[from_idx] = ProviderStatus::Inactive;
        }

        let mut next = None;
        for (idx, registered) in self.providers.iter().enumerate() {
            if idx == from_idx || tried.contains(&idx) {
                continue;
            }
            if self.monitor.is_healthy(&registered.provider).await {
                next = Some(idx);
                break;
            }
        }

        match next {
            Some(idx) => {
                {
                    let mut state = self.state.write().await;
                    state.active = Some(idx);
                    state.statuses[idx] = ProviderStatus::Active;
                    state.consecutive_terminal_failures[idx] = 0;
                }
                let to_name = self.providers[idx].provider.name().clone();
                self.open_period_logged(&to_name).await;

                let event = FailoverEvent {
                    id: Uuid::new_v4(),
                    transaction_id: transaction.cloned(),
                    capability: self.capability,
                    from_provider: from_name.clone(),
                    to_provider: to_name.clone(),
                    reason,
                    occurred_at: chrono::Utc::now(),
                };
                if let Err(error) = self.ledger.record_failover(event).await {
                    tracing::error!(%error, "failed to record failover event");
                }

                tracing::warn!(
                    capability = %self.capability,
                    from = %from_name,
                    to = %to_name,
                    reason = %reason,
                    "failed over"
                );
                Some(idx)
            }
            None => {
                tracing::error!(
                    capability = %self.capability,
                    from = %from_name,
                    "failover found no eligible provider"
                );
                None
            }
        }
    }

    async fn open_period_logged(&self, name: &ProviderName) {
        if let Err(error) = self.ledger.open_period(name, self.capability).await {
            tracing::warn!(provider = %name, %error, "could not open performance period");
        }
    }

    async fn close_period_logged(&self, name: &ProviderName, reason: PeriodEndReason) {
        match self.ledger.close_period(name, reason).await {
            Ok(()) => {}
            // A provider that was never activated has no open period
            Err(LedgerError::NoOpenPeriod { .. }) => {}
            Err(error) => {
                tracing::warn!(provider = %name, %error, "could not close performance period");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::health::HealthMonitorConfig;
    use crate::services::ledger::RealTransactionLedger;
    use crate::traits::MockProvider;
    use shared::HealthProbe;

    fn healthy_provider(name: &str) -> Arc<dyn Provider> {
        provider_with_probe(name, true)
    }

    fn provider_with_probe(name: &str, healthy: bool) -> Arc<dyn Provider> {
        let mut provider = MockProvider::new();
        provider.expect_name().return_const(ProviderName::from(name));
        provider.expect_capability().return_const(Capability::Email);
        provider
            .expect_capabilities()
            .return_const(CapabilityFlags::default());
        provider.expect_probe_health().returning(move || {
            if healthy {
                HealthProbe::up(10)
            } else {
                HealthProbe::down("unreachable")
            }
        });
        Arc::new(provider)
    }

    fn registry_with(providers: Vec<(Arc<dyn Provider>, u8)>) -> ProviderRegistry {
        let ledger = Arc::new(RealTransactionLedger::new());
        let monitor = Arc::new(HealthMonitor::new(
            ledger.clone(),
            HealthMonitorConfig::default(),
        ));
        let mut registry = ProviderRegistry::new(
            Capability::Email,
            ledger,
            monitor,
            RegistryConfig::default(),
        );
        for (provider, priority) in providers {
            registry.register(provider, priority, None);
        }
        registry
    }

    #[tokio::test]
    async fn test_lowest_priority_healthy_provider_wins() {
        let registry = registry_with(vec![
            (healthy_provider("mailgun"), 2),
            (healthy_provider("sendgrid"), 1),
        ]);

        let active = registry.activate_initial().await.unwrap();
        assert_eq!(active, ProviderName::from("sendgrid"));
        assert_eq!(
            registry.active_provider_name().await,
            Some(ProviderName::from("sendgrid"))
        );
    }

    #[tokio::test]
    async fn test_unhealthy_provider_skipped_on_activation() {
        let registry = registry_with(vec![
            (provider_with_probe("sendgrid", false), 1),
            (healthy_provider("mailgun"), 2),
        ]);

        let active = registry.activate_initial().await.unwrap();
        assert_eq!(active, ProviderName::from("mailgun"));
    }

    #[tokio::test]
    async fn test_zero_providers_yields_no_provider_not_a_panic() {
        let registry = registry_with(vec![]);

        assert!(registry.active_provider().await.is_none());
        let err = registry.activate_initial().await.unwrap_err();
        assert!(matches!(
            err,
            SwitchboardError::NoProviderAvailable {
                capability: Capability::Email
            }
        ));
    }

    #[tokio::test]
    async fn test_set_active_unknown_provider() {
        let registry = registry_with(vec![(healthy_provider("sendgrid"), 1)]);

        let err = registry
            .set_active_provider(&ProviderName::from("postmark"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::ProviderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_set_active_rejects_unhealthy_provider() {
        let registry = registry_with(vec![
            (healthy_provider("sendgrid"), 1),
            (provider_with_probe("mailgun", false), 2),
        ]);
        registry.activate_initial().await.unwrap();

        let err = registry
            .set_active_provider(&ProviderName::from("mailgun"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::ProviderUnhealthy { .. }));
        // Active provider unchanged
        assert_eq!(
            registry.active_provider_name().await,
            Some(ProviderName::from("sendgrid"))
        );
    }

    #[tokio::test]
    async fn test_capability_fallback_does_not_mutate_active() {
        let mut bulk_capable = MockProvider::new();
        bulk_capable
            .expect_name()
            .return_const(ProviderName::from("mailgun"));
        bulk_capable.expect_capability().return_const(Capability::Email);
        bulk_capable.expect_capabilities().return_const(CapabilityFlags {
            supports_bulk: true,
            ..Default::default()
        });
        bulk_capable
            .expect_probe_health()
            .returning(|| HealthProbe::up(5));

        let registry = registry_with(vec![
            (healthy_provider("sendgrid"), 1),
            (Arc::new(bulk_capable), 2),
        ]);
        registry.activate_initial().await.unwrap();

        let required = CapabilityFlags {
            supports_bulk: true,
            ..Default::default()
        };
        let chosen = registry.provider_with_capability(&required).await.unwrap();
        assert_eq!(chosen.name(), &ProviderName::from("mailgun"));

        // The fallback answer did not change who is active
        assert_eq!(
            registry.active_provider_name().await,
            Some(ProviderName::from("sendgrid"))
        );
    }

    #[tokio::test]
    async fn test_no_capable_provider_yields_no_provider() {
        let registry = registry_with(vec![(healthy_provider("sendgrid"), 1)]);
        registry.activate_initial().await.unwrap();

        let required = CapabilityFlags {
            supports_attachments: true,
            ..Default::default()
        };
        let err = match registry.provider_with_capability(&required).await {
            Ok(_) => panic!("expected an error, got a provider"),
            Err(e) => e,
        };
        assert!(matches!(err, SwitchboardError::NoProviderAvailable { .. }));
    }
}
