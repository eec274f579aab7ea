//! ElevenLabs text-to-speech adapter
//!
//! Payload fields: `text`, and optionally `voice_id` to override the
//! configured default voice.

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

pub struct ElevenLabsProvider {
    name: ProviderName,
    client: reqwest::Client,
    settings: RwLock<Option<ProviderSettings>>,
}

impl ElevenLabsProvider {
    const DEFAULT_ENDPOINT: &'static str = "https://api.elevenlabs.io/v1";
    const VOICE_KEY: &'static str = "ELEVENLABS_VOICE_ID";
    const DEFAULT_VOICE: &'static str = "21m00Tcm4TlvDq8ikWAM";

    pub fn new() -> Self {
        Self {
            name: ProviderName::from("elevenlabs"),
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

impl Default for ElevenLabsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ElevenLabsProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Speech
    }

    fn capabilities(&self) -> CapabilityFlags {
        CapabilityFlags {
            supports_bulk: false,
            supports_attachments: false,
            // Characters per synthesis request
            max_payload_bytes: Some(5_000),
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
                message: "elevenlabs requires an API key".to_string(),
            });
        }

        *self.settings.write().await = Some(merged);
        Ok(())
    }

    async fn probe_health(&self) -> HealthProbe {
        let settings = match self.settings.read().await.clone() {
            Some(settings) => settings,
            None => return HealthProbe::down("not initialized"),
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .get(format!("{}/user", Self::endpoint(&settings)))
            .header("xi-api-key", &settings.credential)
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

        let text = request
            .payload
            .get("text")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                ProviderFailure::InvalidRequest("missing payload field 'text'".into())
            })?;

        let voice_id = request
            .payload
            .get("voice_id")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| settings.extra.get(Self::VOICE_KEY).cloned())
            .unwrap_or_else(|| Self::DEFAULT_VOICE.to_string());

        let body = serde_json::json!({
            "text": text,
            "model_id": "eleven_multilingual_v2",
        });

        let response = self
            .client
            .post(format!(
                "{}/text-to-speech/{voice_id}",
                Self::endpoint(&settings)
            ))
            .header("xi-api-key", &settings.credential)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        // The response body is the synthesized audio itself
        let audio = response.bytes().await.map_err(classify_transport)?;

        Ok(OperationOutcome {
            provider_message_id: None,
            cost_cents: settings.cost_per_operation_cents,
            metadata: HashMap::from([
                (
                    "voice_id".to_string(),
                    serde_json::Value::String(voice_id),
                ),
                (
                    "audio_bytes".to_string(),
                    serde_json::json!(audio.len()),
                ),
            ]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_requires_api_key() {
        let provider = ElevenLabsProvider::new();
        let err = provider
            .initialize(ProviderSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_execute_rejects_missing_text() {
        let provider = ElevenLabsProvider::new();
        provider
            .initialize(ProviderSettings {
                credential: "el-test-key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let request =
            OperationRequest::new(serde_json::json!({ "voice_id": "abc" }), "story", "story-4");
        let err = provider.execute(&request).await.unwrap_err();
        assert!(matches!(err, ProviderFailure::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_probe_before_initialize_is_unhealthy() {
        let provider = ElevenLabsProvider::new();
        let probe = provider.probe_health().await;
        assert!(!probe.healthy);
        assert_eq!(probe.error.as_deref(), Some("not initialized"));
    }
}
