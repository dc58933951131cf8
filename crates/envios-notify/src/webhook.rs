//! Webhook delivery of customer notifications.
//!
//! Each message is POSTed as JSON to the configured URL. When a secret is
//! set the body is signed with HMAC-SHA256 and the hex digest sent in the
//! `X-Envios-Signature: sha256=<hex>` header.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use envios_types::{DeliveryState, NotificationIntent};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::Notifier;

pub const SIGNATURE_HEADER: &str = "X-Envios-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Webhook configuration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// The URL to POST messages to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Optional secret for signing payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Request timeout (default: 10s)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Body of a webhook POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub timestamp: DateTime<Utc>,
    pub ticket: String,
    pub phone: String,
    pub state: DeliveryState,
    pub message: String,
}

impl WebhookPayload {
    pub fn from_intent(intent: &NotificationIntent, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ticket: intent.ticket.clone(),
            phone: intent.phone.clone(),
            state: intent.state,
            message: intent.message.clone(),
        }
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).context("invalid webhook secret")?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .context("webhook notifier requires notify.webhook.url")?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            url,
            secret: config.secret.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, intent: &NotificationIntent) -> Result<()> {
        let payload = WebhookPayload::from_intent(intent, Utc::now());
        let json = serde_json::to_string(&payload).context("failed to serialize webhook payload")?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", sign(secret, json.as_bytes())?));
        }

        let response = request
            .body(json)
            .send()
            .await
            .context("failed to send webhook request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned error status {}: {}", status, body);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
