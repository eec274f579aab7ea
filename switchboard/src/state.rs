//! Composition root
//!
//! One `Switchboard` owns one registry per capability category plus the
//! shared ledger and health monitor. It is constructed once at startup and
//! passed by reference to callers; there is no global registry state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SwitchboardConfig;
use crate::core::executor::RetryPolicy;
use crate::core::health::{HealthMonitor, HealthMonitorConfig};
use crate::core::registry::{ProviderRegistry, RegistryConfig};
use crate::error::SwitchboardResult;
use crate::services::{
    ElevenLabsProvider, MailgunProvider, RealTransactionLedger, SendgridProvider, TwilioProvider,
};
use crate::traits::Provider;
use shared::Capability;

pub struct Switchboard {
    registries: HashMap<Capability, ProviderRegistry>,
    ledger: Arc<RealTransactionLedger>,
    monitor: Arc<HealthMonitor>,
}

impl Switchboard {
    /// Build registries from bootstrap configuration and elect initial
    /// active providers
    ///
    /// A provider with invalid configuration is excluded from selection
    /// and reported; it never takes the rest of the category down. A
    /// category where nothing is healthy simply starts without an active
    /// provider.
    pub async fn from_config(config: SwitchboardConfig) -> SwitchboardResult<Self> {
        let ledger = Arc::new(RealTransactionLedger::new());
        let monitor = Arc::new(HealthMonitor::new(
            ledger.clone(),
            HealthMonitorConfig {
                check_interval: config.health_check_interval,
                hysteresis_window: config.hysteresis_window,
            },
        ));

        let registry_config = RegistryConfig {
            default_retry: config.retry.clone(),
            consecutive_failure_threshold: config.consecutive_failure_threshold,
            cost_alert_threshold_cents: config.cost_alert_threshold_cents,
        };

        let mut registries: HashMap<Capability, ProviderRegistry> = HashMap::new();

        for bootstrap in &config.providers {
            let provider: Arc<dyn Provider> = match bootstrap.name.as_str() {
                "sendgrid" => Arc::new(SendgridProvider::new()),
                "mailgun" => Arc::new(MailgunProvider::new()),
                "twilio" => Arc::new(TwilioProvider::new()),
                "elevenlabs" => Arc::new(ElevenLabsProvider::new()),
                other => {
                    tracing::warn!(provider = other, "no adapter for configured provider, skipping");
                    continue;
                }
            };

            if let Err(error) = provider.initialize(bootstrap.settings.clone()).await {
                tracing::error!(
                    provider = %bootstrap.name,
                    %error,
                    "provider configuration invalid, excluded from selection"
                );
                continue;
            }

            let retry = RetryPolicy {
                timeout: bootstrap.settings.timeout,
                ..config.retry.clone()
            };

            registries
                .entry(bootstrap.capability)
                .or_insert_with(|| {
                    ProviderRegistry::new(
                        bootstrap.capability,
                        ledger.clone(),
                        monitor.clone(),
                        registry_config.clone(),
                    )
                })
                .register(provider, bootstrap.priority, Some(retry));
        }

        let switchboard = Self {
            registries,
            ledger,
            monitor,
        };

        for registry in switchboard.registries.values() {
            if let Err(error) = registry.activate_initial().await {
                tracing::warn!(
                    capability = %registry.capability(),
                    %error,
                    "category starts without an active provider"
                );
            }
        }

        Ok(switchboard)
    }

    pub fn registry(&self, capability: Capability) -> Option<&ProviderRegistry> {
        self.registries.get(&capability)
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities: Vec<Capability> = self.registries.keys().copied().collect();
        capabilities.sort_by_key(|capability| capability.as_str());
        capabilities
    }

    pub fn ledger(&self) -> &Arc<RealTransactionLedger> {
        &self.ledger
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Run one health sweep across every category
    pub async fn check_health(&self) {
        for registry in self.registries.values() {
            registry.check_health().await;
        }
    }
}
