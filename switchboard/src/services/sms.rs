//! Twilio SMS adapter
//!
//! Payload fields: `to` and `body`. The sender number and account SID come
//! from configuration (`TWILIO_FROM_NUMBER`, `TWILIO_ACCOUNT_SID`).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::ProviderSettings;
use crate::error::{SwitchboardError, SwitchboardResult};
use crate::services::{classify_status, classify_transport};
use crate::traits::Provider;
use shared::{
    Capability, CapabilityFlags, HealthProbe, OperationOutcome, OperationRequest, ProviderFailure,
    ProviderName,
};

pub struct TwilioProvider {
    name: ProviderName,
    client: reqwest::Client,
    settings: RwLock<Option<ProviderSettings>>,
}

impl TwilioProvider {
    const DEFAULT_ENDPOINT: &'static str = "https://api.twilio.com/2010-04-01";
    const SID_KEY: &'static str = "TWILIO_ACCOUNT_SID";
    const FROM_KEY: &'static str = "TWILIO_FROM_NUMBER";

    pub fn new() -> Self {
        Self {
            name: ProviderName::from("twilio"),
            client: reqwest::Client::new(),
            settings: RwLock::new(None),
        }
    }

    fn endpoint(settings: &ProviderSettings) -> String {
        settings
            .endpoint
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_ENDPOINT.to_string())
    }
}

impl Default for TwilioProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for TwilioProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Sms
    }

    fn capabilities(&self) -> CapabilityFlags {
        CapabilityFlags {
            supports_bulk: false,
            supports_attachments: false,
            // Concatenated SMS limit
            max_payload_bytes: Some(1600),
        }
    }

    async fn initialize(&self, settings: ProviderSettings) -> SwitchboardResult<()> {
        let current = self.settings.read().await.clone();
        let merged = match current.as_ref() {
            Some(existing) => existing.merged_with(&settings),
            None => settings,
        };

        if merged.credential.is_empty() {
            return Err(SwitchboardError::Configuration {
                message: "twilio requires an auth token".to_string(),
            });
        }
        for key in [Self::SID_KEY, Self::FROM_KEY] {
            if !merged.extra.contains_key(key) {
                return Err(SwitchboardError::Configuration {
                    message: format!("twilio requires {key}"),
                });
            }
        }

        *self.settings.write().await = Some(merged);
        Ok(())
    }

    async fn probe_health(&self) -> HealthProbe {
        let settings = match self.settings.read().await.clone() {
            Some(settings) => settings,
            None => return HealthProbe::down("not initialized"),
        };
        let sid = settings.extra[Self::SID_KEY].clone();

        let started = std::time::Instant::now();
        let response = self
            .client
            .get(format!("{}/Accounts/{sid}.json", Self::endpoint(&settings)))
            .basic_auth(&sid, Some(&settings.credential))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                HealthProbe::up(started.elapsed().as_millis() as u64)
            }
            Ok(response) => HealthProbe::down(format!("HTTP {}", response.status())),
            Err(error) => HealthProbe::down(error.to_string()),
        }
    }

    async fn execute(
        &self,
        request: &OperationRequest,
    ) -> Result<OperationOutcome, ProviderFailure> {
        let settings = self
            .settings
            .read()
            .await
            .clone()
            .ok_or_else(|| ProviderFailure::InvalidRequest("provider not initialized".into()))?;
        let sid = settings.extra[Self::SID_KEY].clone();
        let from = settings.extra[Self::FROM_KEY].clone();

        let to = request
            .payload
            .get("to")
            .and_then(|value| value.as_str())
            .ok_or_else(|| ProviderFailure::InvalidRequest("missing payload field 'to'".into()))?;
        let body = request
            .payload
            .get("body")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                ProviderFailure::InvalidRequest("missing payload field 'body'".into())
            })?;

        let params = [("To", to), ("From", from.as_str()), ("Body", body)];

        let response = self
            .client
            .post(format!(
                "{}/Accounts/{sid}/Messages.json",
                Self::endpoint(&settings)
            ))
            .basic_auth(&sid, Some(&settings.credential))
            .form(&params)
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|error| ProviderFailure::ServerError(format!("unparseable response: {error}")))?;
        let message_sid = body
            .get("sid")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());

        Ok(OperationOutcome {
            provider_message_id: message_sid,
            cost_cents: settings.cost_per_operation_cents,
            metadata: HashMap::from([(
                "recipient".to_string(),
                serde_json::Value::String(to.to_string()),
            )]),
        })
    }
}
