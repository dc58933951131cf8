//! Configuration file handling for envios.
//!
//! Configuration lives in `.envios.toml` inside the data directory. Every
//! section and key is optional; omitted values take the defaults below.
//!
//! ```toml
//! [catalog]
//! reasons = ["Entrega", "Retiro y Entrega", "Retiro"]
//!
//! [policy]
//! require_failure_reason = false
//! max_delivery_attempts = 3
//!
//! [timeouts]
//! store = "5s"
//! evidence = "10s"
//!
//! [evidence]
//! backend = "file"
//!
//! [store]
//! kind = "file"
//! lock_wait = "2s"
//!
//! [notify]
//! kind = "webhook"
//! webhook = { url = "https://hooks.example/envios", secret = "change-me" }
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use envios_lifecycle::LifecyclePolicy;
use envios_notify::{NotifierKind, WebhookConfig};
use envios_storage::StorageType;
use envios_store::StoreKind;
use serde::{Deserialize, Serialize};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".envios.toml";

/// Get the config file path for a data directory
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Complete envios configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub policy: LifecyclePolicy,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.catalog.reasons.iter().all(|r| r.trim().is_empty()) {
            bail!("catalog.reasons must name at least one reason");
        }
        if let Some(blank) = self.catalog.reasons.iter().position(|r| r.trim().is_empty()) {
            bail!("catalog.reasons[{}] is empty", blank);
        }
        self.policy.check()?;
        if self.timeouts.store.is_zero() || self.timeouts.evidence.is_zero() {
            bail!("timeouts must be greater than zero");
        }
        if self.store.kind == StoreKind::File && self.store.lock_wait >= self.timeouts.store {
            bail!(
                "store.lock_wait ({}) must be shorter than timeouts.store ({})",
                humantime::format_duration(self.store.lock_wait),
                humantime::format_duration(self.timeouts.store)
            );
        }
        if self.notify.kind == NotifierKind::Webhook
            && self.notify.webhook.url.as_deref().is_none_or(|u| u.trim().is_empty())
        {
            bail!("notify.kind = \"webhook\" requires notify.webhook.url");
        }
        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("server.bind is not a socket address: {}", self.server.bind))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config to TOML")
    }
}

/// Reference data offered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_reasons")]
    pub reasons: Vec<String>,
}

fn default_reasons() -> Vec<String> {
    envios_types::default_reasons()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            reasons: default_reasons(),
        }
    }
}

/// Bounds on collaborator calls. Elapsed timeouts fail the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub store: Duration,
    #[serde(default = "default_evidence_timeout", with = "humantime_serde")]
    pub evidence: Duration,
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_evidence_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            store: default_store_timeout(),
            evidence: default_evidence_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default)]
    pub backend: StorageType,
    /// Public URL prefix for file-backed evidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Age after which a store lock is considered abandoned
    #[serde(default = "default_stale_lock_after", with = "humantime_serde")]
    pub stale_lock_after: Duration,
    /// How long a writer waits for the store lock. Must be shorter than
    /// `timeouts.store`; a write still waiting at that point is abandoned.
    #[serde(default = "default_lock_wait", with = "humantime_serde")]
    pub lock_wait: Duration,
}

fn default_stale_lock_after() -> Duration {
    Duration::from_secs(30)
}

fn default_lock_wait() -> Duration {
    Duration::from_secs(2)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            stale_lock_after: default_stale_lock_after(),
            lock_wait: default_lock_wait(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    /// Public tracking page linked from customer messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_base_url: Option<String>,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Load configuration from a data directory. A missing file yields defaults.
pub fn load_config(dir: &Path) -> Result<Config> {
    load_config_from_file(&config_path(dir))
}

/// Load configuration from a specific file path
pub fn load_config_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Save configuration to the data directory
pub fn save_config(dir: &Path, config: &Config) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create data dir: {}", dir.display()))?;
    let path = config_path(dir);
    std::fs::write(&path, config.to_toml()?)
        .with_context(|| format!("failed to write config file: {}", path.display()))?;
    Ok(())
}
