//! Customer notifications for envios.
//!
//! Notifications are best-effort. [`dispatch`] runs delivery on a spawned
//! task, logs failures at `warn`, and records every attempt in the
//! [`MessageLog`]. A failed notification never affects the shipment.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use envios_types::{MessageRecord, NotificationIntent};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

mod message_log;
mod webhook;

pub use message_log::{MESSAGES_FILE, MessageLog, messages_path};
pub use webhook::{SIGNATURE_HEADER, WebhookConfig, WebhookNotifier, WebhookPayload, sign};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. An error means the recipient was not reached.
    async fn send(&self, intent: &NotificationIntent) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Selects a notifier implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write messages to the tracing log only
    #[default]
    Log,
    /// POST messages to a webhook
    Webhook,
}

impl fmt::Display for NotifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierKind::Log => write!(f, "log"),
            NotifierKind::Webhook => write!(f, "webhook"),
        }
    }
}

impl FromStr for NotifierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "log" => Ok(NotifierKind::Log),
            "webhook" | "http" => Ok(NotifierKind::Webhook),
            _ => anyhow::bail!("unknown notifier: {}", s),
        }
    }
}

/// Logs each message and reports it as sent.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, intent: &NotificationIntent) -> Result<()> {
        tracing::info!(
            ticket = %intent.ticket,
            phone = %intent.phone,
            state = %intent.state,
            message = %intent.message,
            "notification"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Keeps every intent in memory; optionally fails each send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationIntent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records intents but reports every send as failed.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<NotificationIntent> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, intent: &NotificationIntent) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(intent.clone());
        }
        if self.fail {
            anyhow::bail!("recording notifier configured to fail");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Deliver `intent` on a spawned task and record the attempt.
///
/// The returned handle may be dropped; it is only useful for tests and
/// graceful shutdown.
pub fn dispatch(notifier: Arc<dyn Notifier>, log: Arc<MessageLog>, intent: NotificationIntent) -> JoinHandle<()> {
    tokio::spawn(async move {
        let sent = match notifier.send(&intent).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    notifier = notifier.name(),
                    ticket = %intent.ticket,
                    state = %intent.state,
                    error = %format!("{e:#}"),
                    "notification delivery failed"
                );
                false
            }
        };
        let record = MessageRecord::from_intent(&intent, sent, Utc::now());
        if let Err(e) = log.append(&record).await {
            tracing::warn!(ticket = %intent.ticket, error = %format!("{e:#}"), "failed to append message log");
        }
    })
}
