//! Transactional email adapters: SendGrid and Mailgun
//!
//! Both translate the uniform provider contract into their back end's wire
//! protocol. Payload fields: `to`, `subject`, and `text` (and optionally
//! `html` for SendGrid).

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

fn required_field<'a>(
    request: &'a OperationRequest,
    field: &str,
) -> Result<&'a str, ProviderFailure> {
    request
        .payload
        .get(field)
        .and_then(|value| value.as_str())
        .ok_or_else(|| ProviderFailure::InvalidRequest(format!("missing payload field '{field}'")))
}

/// SendGrid v3 mail adapter
pub struct SendgridProvider {
    name: ProviderName,
    client: reqwest::Client,
    settings: RwLock<Option<ProviderSettings>>,
}

impl SendgridProvider {
    const DEFAULT_ENDPOINT: &'static str = "https://api.sendgrid.com/v3";

    pub fn new() -> Self {
        Self {
            name: ProviderName::from("sendgrid"),
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

impl Default for SendgridProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for SendgridProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Email
    }

    fn capabilities(&self) -> CapabilityFlags {
        CapabilityFlags {
            supports_bulk: true,
            supports_attachments: true,
            max_payload_bytes: Some(30_000_000),
        }
    }

    async fn initialize(&self, settings: ProviderSettings) -> SwitchboardResult<()> {
        if settings.credential.is_empty() {
            let current = self.settings.read().await;
            if current.is_none() {
                return Err(SwitchboardError::Configuration {
                    message: "sendgrid requires an API key".to_string(),
                });
            }
        }

        let mut current = self.settings.write().await;
        let merged = match current.as_ref() {
            Some(existing) => existing.merged_with(&settings),
            None => settings,
        };
        *current = Some(merged);
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
            .get(format!("{}/user/credits", Self::endpoint(&settings)))
            .bearer_auth(&settings.credential)
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

        let to = required_field(request, "to")?;
        let subject = required_field(request, "subject")?;
        let text = required_field(request, "text")?;
        let html = request.payload.get("html").and_then(|value| value.as_str());

        let mut content = vec![serde_json::json!({ "type": "text/plain", "value": text })];
        if let Some(html) = html {
            content.push(serde_json::json!({ "type": "text/html", "value": html }));
        }
        let body = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": request.payload.get("from").and_then(|v| v.as_str()).unwrap_or("no-reply@fablecraft.app") },
            "subject": subject,
            "content": content,
        });

        let response = self
            .client
            .post(format!("{}/mail/send", Self::endpoint(&settings)))
            .bearer_auth(&settings.credential)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        Ok(OperationOutcome {
            provider_message_id: message_id,
            cost_cents: settings.cost_per_operation_cents,
            metadata: HashMap::from([(
                "recipient".to_string(),
                serde_json::Value::String(to.to_string()),
            )]),
        })
    }
}

/// Mailgun messages adapter; requires a sending domain
pub struct MailgunProvider {
    name: ProviderName,
    client: reqwest::Client,
    settings: RwLock<Option<ProviderSettings>>,
}

impl MailgunProvider {
    const DEFAULT_ENDPOINT: &'static str = "https://api.mailgun.net/v3";
    const DOMAIN_KEY: &'static str = "MAILGUN_DOMAIN";

    pub fn new() -> Self {
        Self {
            name: ProviderName::from("mailgun"),
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

impl Default for MailgunProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MailgunProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Email
    }

    fn capabilities(&self) -> CapabilityFlags {
        CapabilityFlags {
            supports_bulk: true,
            supports_attachments: false,
            max_payload_bytes: Some(25_000_000),
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
                message: "mailgun requires an API key".to_string(),
            });
        }
        if !merged.extra.contains_key(Self::DOMAIN_KEY) {
            return Err(SwitchboardError::Configuration {
                message: "mailgun requires a sending domain (MAILGUN_DOMAIN)".to_string(),
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
        let domain = settings.extra[Self::DOMAIN_KEY].clone();

        let started = std::time::Instant::now();
        let response = self
            .client
            .get(format!("{}/domains/{domain}", Self::endpoint(&settings)))
            .basic_auth("api", Some(&settings.credential))
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
        let domain = settings.extra[Self::DOMAIN_KEY].clone();

        let to = required_field(request, "to")?;
        let subject = required_field(request, "subject")?;
        let text = required_field(request, "text")?;

        let from = request
            .payload
            .get("from")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .unwrap_or_else(|| format!("no-reply@{domain}"));

        let params = [
            ("from", from.as_str()),
            ("to", to),
            ("subject", subject),
            ("text", text),
        ];

        let response = self
            .client
            .post(format!("{}/{domain}/messages", Self::endpoint(&settings)))
            .basic_auth("api", Some(&settings.credential))
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
        let message_id = body
            .get("id")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());

        Ok(OperationOutcome {
            provider_message_id: message_id,
            cost_cents: settings.cost_per_operation_cents,
            metadata: HashMap::from([(
                "recipient".to_string(),
                serde_json::Value::String(to.to_string()),
            )]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_request() -> OperationRequest {
        OperationRequest::new(
            serde_json::json!({
                "to": "reader@example.com",
                "subject": "Your story is ready",
                "text": "Chapter one awaits."
            }),
            "story",
            "story-123",
        )
    }

    #[tokio::test]
    async fn test_sendgrid_requires_credential() {
        let provider = SendgridProvider::new();
        let err = provider
            .initialize(ProviderSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_sendgrid_execute_before_initialize_is_invalid_request() {
        let provider = SendgridProvider::new();
        let err = provider.execute(&email_request()).await.unwrap_err();
        assert!(matches!(err, ProviderFailure::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_sendgrid_rejects_missing_recipient() {
        let provider = SendgridProvider::new();
        provider
            .initialize(ProviderSettings {
                credential: "sg-test-key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let request = OperationRequest::new(
            serde_json::json!({ "subject": "hi", "text": "body" }),
            "story",
            "story-1",
        );
        let err = provider.execute(&request).await.unwrap_err();
        match err {
            ProviderFailure::InvalidRequest(message) => assert!(message.contains("to")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sendgrid_reinitialize_merges_settings() {
        let provider = SendgridProvider::new();
        provider
            .initialize(ProviderSettings {
                credential: "sg-key-1".to_string(),
                endpoint: Some("https://sandbox.sendgrid.test/v3".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        // Second call without a credential keeps the first one
        provider
            .initialize(ProviderSettings::default())
            .await
            .unwrap();

        let settings = provider.settings.read().await.clone().unwrap();
        assert_eq!(settings.credential, "sg-key-1");
        assert_eq!(
            settings.endpoint.as_deref(),
            Some("https://sandbox.sendgrid.test/v3")
        );
    }

    #[tokio::test]
    async fn test_mailgun_requires_domain() {
        let provider = MailgunProvider::new();
        let err = provider
            .initialize(ProviderSettings {
                credential: "mg-test-key".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            SwitchboardError::Configuration { message } => {
                assert!(message.contains("MAILGUN_DOMAIN"));
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mailgun_capability_flags() {
        let provider = MailgunProvider::new();
        let flags = provider.capabilities();
        assert!(flags.supports_bulk);
        assert!(!flags.supports_attachments);
    }
}
