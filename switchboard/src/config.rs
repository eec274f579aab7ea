//! Environment-based provider configuration
//!
//! The orchestration layer treats configuration as a read-once bootstrap
//! input. Credentials, priorities, and category-specific fields are loaded
//! from the environment (with `.env` support for local development); a
//! provider without a credential is skipped, and only an explicitly
//! enabled provider with a missing credential is a hard error.
//!
//! ## Recognized variables, per provider `<NAME>`
//! - `<NAME>_API_KEY` (Twilio: `TWILIO_AUTH_TOKEN`): credential material
//! - `SWITCHBOARD_<NAME>_PRIORITY`: selection priority, lower preferred
//! - `SWITCHBOARD_<NAME>_ENABLED`: `true`/`false` override
//! - `SWITCHBOARD_<NAME>_TIMEOUT_SECS`: per-provider operation deadline
//! - `SWITCHBOARD_<NAME>_COST_CENTS`: flat per-operation cost
//! - `SWITCHBOARD_<NAME>_ENDPOINT`: endpoint override (sandboxes, proxies)
//!
//! ## Category-specific mandatory fields
//! - Mailgun: `MAILGUN_DOMAIN`
//! - Twilio: `TWILIO_ACCOUNT_SID`, `TWILIO_FROM_NUMBER`
//! - ElevenLabs: `ELEVENLABS_VOICE_ID` (optional, default voice used)

use std::collections::HashMap;
use std::time::Duration;

use crate::core::executor::RetryPolicy;
use crate::error::{SwitchboardError, SwitchboardResult};
use shared::{Capability, ProviderName};

/// Per-provider runtime settings handed to `Provider::initialize`
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub credential: String,
    pub endpoint: Option<String>,
    pub timeout: Duration,
    /// Flat per-operation cost in the smallest currency unit
    pub cost_per_operation_cents: u64,
    /// Category-specific fields (sending domain, account sid, voice id)
    pub extra: HashMap<String, String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            credential: String::new(),
            endpoint: None,
            timeout: Duration::from_secs(30),
            cost_per_operation_cents: 0,
            extra: HashMap::new(),
        }
    }
}

impl ProviderSettings {
    /// Merge `other` over `self`: an empty credential or missing endpoint
    /// keeps the existing value, extras are extended, and scalar fields
    /// take the new value. Supports idempotent re-initialize.
    pub fn merged_with(&self, other: &ProviderSettings) -> ProviderSettings {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        ProviderSettings {
            credential: if other.credential.is_empty() {
                self.credential.clone()
            } else {
                other.credential.clone()
            },
            endpoint: other.endpoint.clone().or_else(|| self.endpoint.clone()),
            timeout: other.timeout,
            cost_per_operation_cents: other.cost_per_operation_cents,
            extra,
        }
    }
}

/// One provider entry produced by the bootstrap
#[derive(Debug, Clone)]
pub struct ProviderBootstrap {
    pub name: ProviderName,
    pub capability: Capability,
    pub priority: u8,
    pub settings: ProviderSettings,
}

/// Full orchestration-layer configuration
#[derive(Debug, Clone)]
pub struct SwitchboardConfig {
    pub providers: Vec<ProviderBootstrap>,
    pub health_check_interval: Duration,
    pub hysteresis_window: usize,
    pub retry: RetryPolicy,
    /// Terminal failures in a row before a provider is failed away from
    pub consecutive_failure_threshold: u32,
    /// Monthly per-provider cost threshold; None disables cost alerts
    pub cost_alert_threshold_cents: Option<u64>,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            health_check_interval: Duration::from_secs(300),
            hysteresis_window: 3,
            retry: RetryPolicy::default(),
            consecutive_failure_threshold: 5,
            cost_alert_threshold_cents: None,
        }
    }
}

/// Built-in provider table: name, category, credential variable, default
/// priority, default per-operation cost, category-specific extras.
const KNOWN_PROVIDERS: &[(&str, Capability, &str, u8, u64, &[&str])] = &[
    ("sendgrid", Capability::Email, "SENDGRID_API_KEY", 1, 10, &[]),
    ("mailgun", Capability::Email, "MAILGUN_API_KEY", 2, 8, &["MAILGUN_DOMAIN"]),
    (
        "twilio",
        Capability::Sms,
        "TWILIO_AUTH_TOKEN",
        1,
        75,
        &["TWILIO_ACCOUNT_SID", "TWILIO_FROM_NUMBER"],
    ),
    (
        "elevenlabs",
        Capability::Speech,
        "ELEVENLABS_API_KEY",
        1,
        30,
        &["ELEVENLABS_VOICE_ID"],
    ),
];

impl SwitchboardConfig {
    /// Load the bootstrap configuration from the environment
    ///
    /// Safe to call multiple times; dotenv ignores already-set variables.
    pub fn from_env() -> SwitchboardResult<Self> {
        // Silently fine when no .env file exists
        let _ = dotenv::dotenv();

        let mut providers = Vec::new();

        for &(name, capability, credential_var, default_priority, default_cost, extras) in
            KNOWN_PROVIDERS
        {
            let upper = name.to_uppercase();
            let enabled = read_bool(&format!("SWITCHBOARD_{upper}_ENABLED"));

            let credential = match std::env::var(credential_var) {
                Ok(value) if !value.is_empty() => value,
                _ => {
                    if enabled == Some(true) {
                        return Err(SwitchboardError::Configuration {
                            message: format!(
                                "{name} is enabled but {credential_var} is not set"
                            ),
                        });
                    }
                    tracing::warn!(provider = name, "no credential configured, skipping");
                    continue;
                }
            };

            if enabled == Some(false) {
                tracing::info!(provider = name, "disabled by configuration, skipping");
                continue;
            }

            let priority =
                read_priority(&format!("SWITCHBOARD_{upper}_PRIORITY"), default_priority)?;
            let timeout = std::env::var(format!("SWITCHBOARD_{upper}_TIMEOUT_SECS"))
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30));
            let cost = std::env::var(format!("SWITCHBOARD_{upper}_COST_CENTS"))
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default_cost);
            let endpoint = std::env::var(format!("SWITCHBOARD_{upper}_ENDPOINT")).ok();

            let mut extra = HashMap::new();
            for &var in extras {
                if let Ok(value) = std::env::var(var) {
                    extra.insert(var.to_string(), value);
                }
            }

            providers.push(ProviderBootstrap {
                name: ProviderName::from(name),
                capability,
                priority,
                settings: ProviderSettings {
                    credential,
                    endpoint,
                    timeout,
                    cost_per_operation_cents: cost,
                    extra,
                },
            });
        }

        Ok(Self {
            providers,
            ..Default::default()
        })
    }
}

fn read_bool(var: &str) -> Option<bool> {
    match std::env::var(var).ok()?.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn read_priority(var: &str, default: u8) -> SwitchboardResult<u8> {
    match std::env::var(var) {
        Ok(value) => value.parse::<u8>().map_err(|_| {
            shared::SharedError::InvalidPriority {
                input: format!("{var}={value}"),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_merge_keeps_existing_credential() {
        let original = ProviderSettings {
            credential: "key-1".to_string(),
            endpoint: Some("https://sandbox.example.com".to_string()),
            ..Default::default()
        };
        let patch = ProviderSettings::default();

        let merged = original.merged_with(&patch);
        assert_eq!(merged.credential, "key-1");
        assert_eq!(merged.endpoint.as_deref(), Some("https://sandbox.example.com"));
    }

    #[test]
    fn test_settings_merge_overrides_credential() {
        let original = ProviderSettings {
            credential: "key-1".to_string(),
            ..Default::default()
        };
        let patch = ProviderSettings {
            credential: "key-2".to_string(),
            ..Default::default()
        };

        assert_eq!(original.merged_with(&patch).credential, "key-2");
    }

    #[test]
    fn test_settings_merge_extends_extra() {
        let mut original = ProviderSettings::default();
        original
            .extra
            .insert("MAILGUN_DOMAIN".to_string(), "mg.old.example".to_string());

        let mut patch = ProviderSettings::default();
        patch
            .extra
            .insert("MAILGUN_DOMAIN".to_string(), "mg.new.example".to_string());

        let merged = original.merged_with(&patch);
        assert_eq!(merged.extra["MAILGUN_DOMAIN"], "mg.new.example");
    }
}
