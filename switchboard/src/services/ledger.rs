//! In-memory transaction and analytics ledger
//!
//! Durable-record semantics without a database: one `RwLock` guards the
//! whole state, so counter updates are atomic and concurrent writers (one
//! per in-flight operation) cannot lose increments. The terminal-state
//! guard makes late finalization writes a rejection instead of corruption.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::traits::{TransactionLedger, TransactionOutcome};
use shared::{
    Capability, CostAlert, CredentialRotation, FailoverEvent, HealthRecord, MonthlyCost,
    PerformancePeriod, PeriodEndReason, ProviderAnalytics, ProviderHealthState, ProviderName,
    Transaction, TransactionId, TransactionStatus,
};

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<TransactionId, Transaction>,
    failovers: Vec<FailoverEvent>,
    health_records: Vec<HealthRecord>,
    health_states: HashMap<ProviderName, ProviderHealthState>,
    /// Sum and count of probe response times, for the rolling average
    probe_timings: HashMap<ProviderName, (u64, u64)>,
    periods: Vec<PerformancePeriod>,
    /// Index into `periods` for each provider's open period
    open_periods: HashMap<ProviderName, usize>,
    alerts: Vec<CostAlert>,
    rotations: Vec<CredentialRotation>,
}

/// Real ledger implementation backed by process memory
#[derive(Clone)]
pub struct RealTransactionLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl RealTransactionLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
        }
    }
}

impl Default for RealTransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn month_key(timestamp: &chrono::DateTime<Utc>) -> String {
    timestamp.format("%Y-%m").to_string()
}

#[async_trait]
impl TransactionLedger for RealTransactionLedger {
    async fn create_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        // First write wins; duplicate creates from caller retries are no-ops
        state
            .transactions
            .entry(transaction.id.clone())
            .or_insert(transaction);
        Ok(())
    }

    async fn finalize_transaction(
        &self,
        id: &TransactionId,
        outcome: TransactionOutcome,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;

        let transaction = state
            .transactions
            .get_mut(id)
            .ok_or_else(|| LedgerError::TransactionNotFound { id: id.clone() })?;
        if transaction.status.is_terminal() {
            return Err(LedgerError::TerminalTransaction { id: id.clone() });
        }

        let provider = transaction.provider.clone();
        let (success, cost_cents) = match outcome {
            TransactionOutcome::Completed {
                cost_cents,
                response_time_ms,
                metadata,
            } => {
                transaction.status = TransactionStatus::Completed;
                transaction.cost_cents = cost_cents;
                transaction.response_time_ms = Some(response_time_ms);
                transaction.metadata.extend(metadata);
                transaction.completed_at = Some(Utc::now());
                (true, cost_cents)
            }
            TransactionOutcome::Failed {
                error,
                response_time_ms,
                metadata,
            } => {
                transaction.status = TransactionStatus::Failed;
                transaction.error = Some(error);
                transaction.response_time_ms = response_time_ms;
                transaction.metadata.extend(metadata);
                transaction.completed_at = Some(Utc::now());
                (false, 0)
            }
        };

        // Roll the outcome into the provider's open performance period
        if let Some(&period_idx) = state.open_periods.get(&provider) {
            let period = &mut state.periods[period_idx];
            period.requests += 1;
            if success {
                period.successes += 1;
            }
            period.cost_cents += cost_cents;
        }

        Ok(())
    }

    async fn reassign_transaction(
        &self,
        id: &TransactionId,
        provider: &ProviderName,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let transaction = state
            .transactions
            .get_mut(id)
            .ok_or_else(|| LedgerError::TransactionNotFound { id: id.clone() })?;
        if transaction.status.is_terminal() {
            return Err(LedgerError::TerminalTransaction { id: id.clone() });
        }
        transaction.provider = provider.clone();
        Ok(())
    }

    async fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.state.read().await.transactions.get(id).cloned()
    }

    async fn record_health_check(&self, record: HealthRecord) {
        let mut state = self.state.write().await;

        if let Some(response_time) = record.response_time_ms {
            let timing = state
                .probe_timings
                .entry(record.provider.clone())
                .or_insert((0, 0));
            timing.0 += response_time;
            timing.1 += 1;
        }
        let average = state
            .probe_timings
            .get(&record.provider)
            .map(|(sum, count)| if *count == 0 { 0 } else { sum / count })
            .unwrap_or(0);

        let health = state
            .health_states
            .entry(record.provider.clone())
            .or_default();
        health.healthy = record.healthy;
        health.checks_total += 1;
        health.average_response_time_ms = average;
        health.last_checked = Some(record.checked_at);
        if record.healthy {
            health.consecutive_failures = 0;
            health.last_success = Some(record.checked_at);
        } else {
            health.consecutive_failures += 1;
            health.error_count += 1;
            health.last_failure = Some(record.checked_at);
        }

        state.health_records.push(record);
    }

    async fn provider_health(&self, provider: &ProviderName) -> Option<ProviderHealthState> {
        self.state.read().await.health_states.get(provider).cloned()
    }

    async fn record_failover(&self, event: FailoverEvent) -> Result<(), LedgerError> {
        if event.from_provider == event.to_provider {
            return Err(LedgerError::IdenticalFailoverProviders);
        }
        self.state.write().await.failovers.push(event);
        Ok(())
    }

    async fn failover_events(&self) -> Vec<FailoverEvent> {
        self.state.read().await.failovers.clone()
    }

    async fn open_period(
        &self,
        provider: &ProviderName,
        capability: Capability,
    ) -> Result<Uuid, LedgerError> {
        let mut state = self.state.write().await;
        if state.open_periods.contains_key(provider) {
            return Err(LedgerError::PeriodAlreadyOpen {
                name: provider.to_string(),
            });
        }

        let id = Uuid::new_v4();
        state.periods.push(PerformancePeriod {
            id,
            provider: provider.clone(),
            capability,
            started_at: Utc::now(),
            ended_at: None,
            end_reason: None,
            requests: 0,
            successes: 0,
            cost_cents: 0,
        });
        let idx = state.periods.len() - 1;
        state.open_periods.insert(provider.clone(), idx);
        Ok(id)
    }

    async fn close_period(
        &self,
        provider: &ProviderName,
        reason: PeriodEndReason,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let idx = state
            .open_periods
            .remove(provider)
            .ok_or_else(|| LedgerError::NoOpenPeriod {
                name: provider.to_string(),
            })?;
        let period = &mut state.periods[idx];
        period.ended_at = Some(Utc::now());
        period.end_reason = Some(reason);
        Ok(())
    }

    async fn periods(&self, provider: &ProviderName) -> Vec<PerformancePeriod> {
        self.state
            .read()
            .await
            .periods
            .iter()
            .filter(|period| &period.provider == provider)
            .cloned()
            .collect()
    }

    async fn create_cost_alert(
        &self,
        provider: &ProviderName,
        capability: Capability,
        threshold_cents: u64,
        accumulated_cents: u64,
    ) -> CostAlert {
        let mut state = self.state.write().await;

        // One unresolved alert per provider; a second crossing before
        // resolution reuses it
        if let Some(existing) = state
            .alerts
            .iter()
            .find(|alert| !alert.resolved && &alert.provider == provider)
        {
            return existing.clone();
        }

        let alert = CostAlert {
            id: Uuid::new_v4(),
            provider: provider.clone(),
            capability,
            threshold_cents,
            accumulated_cents,
            created_at: Utc::now(),
            resolved: false,
            resolution_notes: None,
            resolved_at: None,
        };
        state.alerts.push(alert.clone());
        alert
    }

    async fn check_cost_threshold(
        &self,
        provider: &ProviderName,
        capability: Capability,
        threshold_cents: u64,
    ) -> Option<CostAlert> {
        let accumulated = {
            let state = self.state.read().await;
            let current_month = month_key(&Utc::now());
            let accumulated: u64 = state
                .transactions
                .values()
                .filter(|transaction| {
                    &transaction.provider == provider
                        && month_key(&transaction.created_at) == current_month
                })
                .map(|transaction| transaction.cost_cents)
                .sum();

            if accumulated < threshold_cents {
                return None;
            }
            if state
                .alerts
                .iter()
                .any(|alert| !alert.resolved && &alert.provider == provider)
            {
                // Already alerted; stay quiet until an operator resolves it
                return None;
            }
            accumulated
        };

        Some(
            self.create_cost_alert(provider, capability, threshold_cents, accumulated)
                .await,
        )
    }

    async fn resolve_cost_alert(&self, id: Uuid, notes: &str) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let alert = state
            .alerts
            .iter_mut()
            .find(|alert| alert.id == id)
            .ok_or(LedgerError::AlertNotFound { id })?;
        alert.resolved = true;
        alert.resolution_notes = Some(notes.to_string());
        alert.resolved_at = Some(Utc::now());
        Ok(())
    }

    async fn cost_alerts(&self) -> Vec<CostAlert> {
        self.state.read().await.alerts.clone()
    }

    async fn record_credential_rotation(&self, provider: &ProviderName) -> Uuid {
        let id = Uuid::new_v4();
        self.state.write().await.rotations.push(CredentialRotation {
            id,
            provider: provider.clone(),
            rotated_at: Utc::now(),
            validated: false,
        });
        id
    }

    async fn mark_rotation_validated(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let rotation = state
            .rotations
            .iter_mut()
            .find(|rotation| rotation.id == id)
            .ok_or(LedgerError::RotationNotFound { id })?;
        rotation.validated = true;
        Ok(())
    }

    async fn credential_rotations(&self, provider: &ProviderName) -> Vec<CredentialRotation> {
        self.state
            .read()
            .await
            .rotations
            .iter()
            .filter(|rotation| &rotation.provider == provider)
            .cloned()
            .collect()
    }

    async fn provider_analytics(
        &self,
        provider: &ProviderName,
        window_days: i64,
    ) -> ProviderAnalytics {
        let state = self.state.read().await;
        let cutoff = Utc::now() - ChronoDuration::days(window_days);

        let transactions: Vec<&Transaction> = state
            .transactions
            .values()
            .filter(|transaction| {
                &transaction.provider == provider && transaction.created_at >= cutoff
            })
            .collect();

        let total_requests = transactions.len() as u64;
        let completed = transactions
            .iter()
            .filter(|transaction| transaction.status == TransactionStatus::Completed)
            .count() as u64;
        let success_rate = if total_requests == 0 {
            0.0
        } else {
            completed as f64 / total_requests as f64
        };

        let timed: Vec<u64> = transactions
            .iter()
            .filter_map(|transaction| transaction.response_time_ms)
            .collect();
        let average_response_time_ms = if timed.is_empty() {
            0.0
        } else {
            timed.iter().sum::<u64>() as f64 / timed.len() as f64
        };

        let total_cost_cents = transactions
            .iter()
            .map(|transaction| transaction.cost_cents)
            .sum();

        let failover_count = state
            .failovers
            .iter()
            .filter(|event| &event.from_provider == provider && event.occurred_at >= cutoff)
            .count() as u64;

        let probes: Vec<&HealthRecord> = state
            .health_records
            .iter()
            .filter(|record| &record.provider == provider && record.checked_at >= cutoff)
            .collect();
        let health_uptime = if probes.is_empty() {
            0.0
        } else {
            probes.iter().filter(|record| record.healthy).count() as f64 / probes.len() as f64
        };

        ProviderAnalytics {
            provider: provider.clone(),
            window_days,
            total_requests,
            success_rate,
            average_response_time_ms,
            total_cost_cents,
            failover_count,
            health_uptime,
        }
    }

    async fn provider_cost_by_month(&self, provider: &ProviderName) -> Vec<MonthlyCost> {
        let state = self.state.read().await;

        let mut buckets: HashMap<String, u64> = HashMap::new();
        for transaction in state.transactions.values() {
            if &transaction.provider != provider {
                continue;
            }
            *buckets.entry(month_key(&transaction.created_at)).or_insert(0) +=
                transaction.cost_cents;
        }

        let mut rollup: Vec<MonthlyCost> = buckets
            .into_iter()
            .map(|(month, cost_cents)| MonthlyCost { month, cost_cents })
            .collect();
        rollup.sort_by(|a, b| a.month.cmp(&b.month));
        rollup
    }
}
