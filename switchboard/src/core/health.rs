//! Provider health caching with TTL and flap suppression
//!
//! Probes are category-specific (the provider decides what to call), but
//! their interpretation is uniform: a TTL cache answers "recently checked"
//! without re-probing, and a short hysteresis window keeps one transient
//! blip from triggering failover thrash.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::traits::{Provider, TransactionLedger};
use shared::{HealthRecord, ProviderName};

/// Explicit cache-with-TTL value, so the TTL policy is testable on its own
#[derive(Debug, Clone, Copy)]
pub struct CachedHealth {
    pub healthy: bool,
    pub checked_at: Instant,
}

impl CachedHealth {
    pub fn is_fresh(&self, interval: Duration) -> bool {
        self.checked_at.elapsed() < interval
    }
}

/// Health monitor tuning
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// How long a probe verdict stays fresh
    pub check_interval: Duration,
    /// Probes considered when deciding whether to flip unhealthy
    pub hysteresis_window: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            hysteresis_window: 3,
        }
    }
}

struct ProbeState {
    cached: CachedHealth,
    /// Raw probe verdicts, newest last, bounded by the hysteresis window
    history: VecDeque<bool>,
}

/// Shared monitor: one instance serves every registry, keyed by provider
/// name, so rotation and sweeps see the same cache the request path does
pub struct HealthMonitor {
    ledger: Arc<dyn TransactionLedger>,
    config: HealthMonitorConfig,
    states: RwLock<HashMap<ProviderName, ProbeState>>,
}

impl HealthMonitor {
    pub fn new(ledger: Arc<dyn TransactionLedger>, config: HealthMonitorConfig) -> Self {
        Self {
            ledger,
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Cached verdict if fresh, otherwise a fresh probe. Never errors;
    /// probe failures resolve to `false`.
    pub async fn is_healthy(&self, provider: &Arc<dyn Provider>) -> bool {
        {
            let states = self.states.read().await;
            if let Some(state) = states.get(provider.name()) {
                if state.cached.is_fresh(self.config.check_interval) {
                    return state.cached.healthy;
                }
            }
        }
        self.refresh(provider).await
    }

    /// Probe now, record the result, and return the hysteresis-adjusted
    /// verdict. The probe itself runs without any lock held, so a slow
    /// provider never blocks checks against another.
    pub async fn refresh(&self, provider: &Arc<dyn Provider>) -> bool {
        let probe = provider.probe_health().await;

        self.ledger
            .record_health_check(HealthRecord {
                provider: provider.name().clone(),
                healthy: probe.healthy,
                response_time_ms: probe.response_time_ms,
                error: probe.error.clone(),
                checked_at: chrono::Utc::now(),
            })
            .await;

        let mut states = self.states.write().await;
        let state = states
            .entry(provider.name().clone())
            .or_insert_with(|| ProbeState {
                cached: CachedHealth {
                    healthy: probe.healthy,
                    checked_at: Instant::now(),
                },
                history: VecDeque::new(),
            });

        state.history.push_back(probe.healthy);
        while state.history.len() > self.config.hysteresis_window {
            state.history.pop_front();
        }

        // A success is always believed. A failure only flips the verdict
        // when the whole window failed; intermittent success within the
        // window keeps the provider eligible.
        let healthy = if probe.healthy {
            true
        } else {
            state.history.iter().any(|h| *h)
        };

        state.cached = CachedHealth {
            healthy,
            checked_at: Instant::now(),
        };

        if !healthy {
            tracing::warn!(
                provider = %provider.name(),
                error = probe.error.as_deref().unwrap_or("probe failed"),
                "provider marked unhealthy"
            );
        }

        healthy
    }

    /// Drop the cached state so the next check probes immediately; used
    /// after credential rotation
    pub async fn invalidate(&self, provider: &ProviderName) {
        self.states.write().await.remove(provider);
    }

    pub async fn cached(&self, provider: &ProviderName) -> Option<CachedHealth> {
        self.states
            .read()
            .await
            .get(provider)
            .map(|state| state.cached)
    }
}
