//! Test fixtures and helpers for switchboard integration tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchboard::{
    HealthMonitor, HealthMonitorConfig, Provider, ProviderRegistry, ProviderSettings,
    RealTransactionLedger, RegistryConfig, RetryPolicy, SwitchboardResult,
};
use shared::{
    Capability, CapabilityFlags, HealthProbe, OperationOutcome, OperationRequest,
    ProviderFailure, ProviderName,
};

/// Provider whose probe and execute behavior is scripted by the test
///
/// Scripted results are consumed front to back; when a script runs dry the
/// fallback applies (healthy probes, successful operations).
pub struct ScriptedProvider {
    name: ProviderName,
    capability: Capability,
    flags: CapabilityFlags,
    cost_cents: u64,
    probe_script: Mutex<VecDeque<bool>>,
    probe_fallback: AtomicBool,
    execute_script: Mutex<VecDeque<Result<OperationOutcome, ProviderFailure>>>,
    execute_calls: AtomicU32,
    last_settings: Mutex<Option<ProviderSettings>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, capability: Capability) -> Arc<Self> {
        Arc::new(Self {
            name: ProviderName::from(name),
            capability,
            flags: CapabilityFlags::default(),
            cost_cents: 10,
            probe_script: Mutex::new(VecDeque::new()),
            probe_fallback: AtomicBool::new(true),
            execute_script: Mutex::new(VecDeque::new()),
            execute_calls: AtomicU32::new(0),
            last_settings: Mutex::new(None),
        })
    }

    pub fn ok_outcome(cost_cents: u64) -> OperationOutcome {
        OperationOutcome {
            provider_message_id: Some("msg-0001".to_string()),
            cost_cents,
            metadata: HashMap::new(),
        }
    }

    pub fn script_probes(&self, verdicts: impl IntoIterator<Item = bool>) {
        self.probe_script.lock().unwrap().extend(verdicts);
    }

    pub fn set_probe_fallback(&self, healthy: bool) {
        self.probe_fallback.store(healthy, Ordering::SeqCst);
    }

    pub fn script_executions(
        &self,
        results: impl IntoIterator<Item = Result<OperationOutcome, ProviderFailure>>,
    ) {
        self.execute_script.lock().unwrap().extend(results);
    }

    pub fn execute_calls(&self) -> u32 {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn last_settings(&self) -> Option<ProviderSettings> {
        self.last_settings.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn capabilities(&self) -> CapabilityFlags {
        self.flags.clone()
    }

    async fn initialize(&self, settings: ProviderSettings) -> SwitchboardResult<()> {
        *self.last_settings.lock().unwrap() = Some(settings);
        Ok(())
    }

    async fn probe_health(&self) -> HealthProbe {
        let scripted = self.probe_script.lock().unwrap().pop_front();
        let healthy = scripted.unwrap_or_else(|| self.probe_fallback.load(Ordering::SeqCst));
        if healthy {
            HealthProbe::up(15)
        } else {
            HealthProbe::down("scripted probe failure")
        }
    }

    async fn execute(
        &self,
        _request: &OperationRequest,
    ) -> Result<OperationOutcome, ProviderFailure> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.execute_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::ok_outcome(self.cost_cents)))
    }
}

/// A registry wired to a real ledger and health monitor
pub struct RegistryHarness {
    pub registry: ProviderRegistry,
    pub ledger: Arc<RealTransactionLedger>,
}

/// Retry policy with millisecond backoff so paused-clock tests stay quick
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_attempts: 3,
        base_delay: Duration::from_millis(50),
    }
}

pub fn email_registry(providers: Vec<(Arc<ScriptedProvider>, u8)>) -> RegistryHarness {
    email_registry_with(providers, 3, None)
}

pub fn email_registry_with(
    providers: Vec<(Arc<ScriptedProvider>, u8)>,
    hysteresis_window: usize,
    cost_alert_threshold_cents: Option<u64>,
) -> RegistryHarness {
    let ledger = Arc::new(RealTransactionLedger::new());
    let monitor = Arc::new(HealthMonitor::new(
        ledger.clone(),
        HealthMonitorConfig {
            check_interval: Duration::from_secs(300),
            hysteresis_window,
        },
    ));

    let mut registry = ProviderRegistry::new(
        Capability::Email,
        ledger.clone(),
        monitor,
        RegistryConfig {
            default_retry: fast_retry(),
            consecutive_failure_threshold: 3,
            cost_alert_threshold_cents,
        },
    );
    for (provider, priority) in providers {
        registry.register(provider, priority, None);
    }

    RegistryHarness { registry, ledger }
}

pub fn email_request() -> OperationRequest {
    OperationRequest::new(
        serde_json::json!({
            "to": "reader@example.com",
            "subject": "Your story is ready",
            "text": "Chapter one awaits."
        }),
        "story",
        "story-42",
    )
}
