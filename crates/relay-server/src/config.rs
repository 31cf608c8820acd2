//! Configuration for the relay service.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [app]
//! address = "0.0.0.0:6000"
//!
//! [providers.prod_alerts]
//! type = "google_chat"
//! endpoint = "https://chat.googleapis.com/v1/spaces/AAA/messages?key=k&token=t"
//! thread_ttl_secs = 43200
//! ```
//!
//! Each `[providers.<name>]` table serves the room `<name>` unless
//! `room_name` overrides it.

use anyhow::{bail, Context, Result};
use relay::{DispatchMetrics, GoogleChatOptions, GoogleChatProvider, Provider};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";

/// Default maximum request body size (5 MiB).
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub app: AppConfig,
    /// Providers keyed by their table name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Socket address to bind.
    #[serde(default = "default_address")]
    pub address: String,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// A configured delivery backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Chat incoming webhook.
    GoogleChat(GoogleChatConfig),
}

/// Google Chat provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleChatConfig {
    /// Incoming webhook URL.
    pub endpoint: String,
    /// Room name; defaults to the provider's table name.
    #[serde(default)]
    pub room_name: Option<String>,
    /// Skip network sends.
    #[serde(default)]
    pub dry_run: bool,
    /// Idle pooled connections per host.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// HTTP(S) proxy for upstream requests. Empty means none.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Idle seconds before an alert thread is forgotten.
    #[serde(default = "default_thread_ttl_secs")]
    pub thread_ttl_secs: u64,
    /// Seconds between thread eviction sweeps.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Extra attempts for transient send failures.
    #[serde(default)]
    pub max_retries: u32,
    /// First retry delay in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl GoogleChatConfig {
    /// Provider options for the given room.
    pub fn to_options(&self, room: &str) -> GoogleChatOptions {
        GoogleChatOptions {
            endpoint: self.endpoint.clone(),
            room: room.to_string(),
            dry_run: self.dry_run,
            max_idle_conns: self.max_idle_conns,
            timeout: Duration::from_secs(self.timeout_secs),
            proxy_url: self.proxy_url.clone().filter(|p| !p.trim().is_empty()),
            thread_ttl: Duration::from_secs(self.thread_ttl_secs),
            prune_interval: Duration::from_secs(self.prune_interval_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl ProviderConfig {
    /// Room served by this provider.
    pub fn room<'a>(&'a self, name: &'a str) -> &'a str {
        match self {
            Self::GoogleChat(cfg) => cfg
                .room_name
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(name),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            bail!("at least one [providers.<name>] table is required");
        }

        let mut rooms = HashSet::new();
        for (name, provider) in &self.providers {
            let room = provider.room(name);
            if !rooms.insert(room) {
                bail!("room {room} is served by more than one provider (duplicate at {name})");
            }

            let ProviderConfig::GoogleChat(cfg) = provider;
            if cfg.endpoint.trim().is_empty() {
                bail!("provider {name}: endpoint is required");
            }
            if cfg.timeout_secs == 0 {
                bail!("provider {name}: timeout_secs must be greater than zero");
            }
            if cfg.thread_ttl_secs == 0 {
                bail!("provider {name}: thread_ttl_secs must be greater than zero");
            }
            if cfg.prune_interval_secs == 0 {
                bail!("provider {name}: prune_interval_secs must be greater than zero");
            }
        }

        Ok(())
    }

    /// Construct every configured provider.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build_providers(&self, metrics: &Arc<DispatchMetrics>) -> Result<Vec<Arc<dyn Provider>>> {
        let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(self.providers.len());

        for (name, provider) in &self.providers {
            let room = provider.room(name);
            match provider {
                ProviderConfig::GoogleChat(cfg) => {
                    let instance = GoogleChatProvider::new(cfg.to_options(room), Arc::clone(metrics))
                        .with_context(|| format!("Failed to initialize provider {name}"))?;
                    providers.push(Arc::new(instance));
                }
            }
        }

        Ok(providers)
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

fn default_max_idle_conns() -> usize {
    50
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_thread_ttl_secs() -> u64 {
    12 * 60 * 60
}

fn default_prune_interval_secs() -> u64 {
    60 * 60
}

fn default_retry_backoff_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[app]
address = "127.0.0.1:7000"

[providers.prod_alerts]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/AAA/messages?key=k&token=t"
timeout_secs = 10
thread_ttl_secs = 3600
max_retries = 2

[providers.staging]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/BBB/messages?key=k&token=t"
room_name = "staging_alerts"
dry_run = true
proxy_url = ""
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.app.address, "127.0.0.1:7000");
        assert_eq!(config.app.body_limit_bytes, DEFAULT_BODY_LIMIT_BYTES);
        assert_eq!(config.providers.len(), 2);

        let ProviderConfig::GoogleChat(prod) = &config.providers["prod_alerts"];
        let options = prod.to_options(config.providers["prod_alerts"].room("prod_alerts"));
        assert_eq!(options.room, "prod_alerts");
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.thread_ttl, Duration::from_secs(3600));
        assert_eq!(options.prune_interval, Duration::from_secs(3600));
        assert_eq!(options.max_idle_conns, 50);
        assert_eq!(options.max_retries, 2);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_room_name_override_and_empty_proxy() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let staging = &config.providers["staging"];
        assert_eq!(staging.room("staging"), "staging_alerts");

        let ProviderConfig::GoogleChat(cfg) = staging;
        let options = cfg.to_options("staging_alerts");
        assert!(options.dry_run);
        assert_eq!(options.proxy_url, None);
        assert_eq!(options.thread_ttl, Duration::from_secs(12 * 60 * 60));
    }

    #[test]
    fn test_app_defaults() {
        let config = Config::from_toml(
            r#"
[providers.ops]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/AAA/messages"
"#,
        )
        .unwrap();
        assert_eq!(config.app.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn test_no_providers_is_rejected() {
        let err = Config::from_toml("[app]\naddress = \"0.0.0.0:6000\"\n").unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn test_duplicate_room_is_rejected() {
        let err = Config::from_toml(
            r#"
[providers.ops]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/AAA/messages"

[providers.ops_backup]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/BBB/messages"
room_name = "ops"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one provider"));
    }

    #[test]
    fn test_unknown_provider_type_is_rejected() {
        let result = Config::from_toml(
            r#"
[providers.ops]
type = "carrier_pigeon"
endpoint = "coo://roof"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let err = Config::from_toml(
            r#"
[providers.ops]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/AAA/messages"
thread_ttl_secs = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("thread_ttl_secs"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[tokio::test]
    async fn test_build_providers() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let metrics = Arc::new(DispatchMetrics::new());
        let providers = config.build_providers(&metrics).unwrap();

        let mut rooms: Vec<&str> = providers.iter().map(|p| p.room()).collect();
        rooms.sort_unstable();
        assert_eq!(rooms, vec!["prod_alerts", "staging_alerts"]);
        assert!(providers.iter().all(|p| p.id() == "google_chat"));
    }

    #[tokio::test]
    async fn test_build_providers_rejects_bad_proxy() {
        let config = Config::from_toml(
            r#"
[providers.ops]
type = "google_chat"
endpoint = "https://chat.googleapis.com/v1/spaces/AAA/messages"
proxy_url = "::bad"
"#,
        )
        .unwrap();
        let metrics = Arc::new(DispatchMetrics::new());
        let err = config.build_providers(&metrics).err().expect("expected build_providers to fail");
        assert!(format!("{err:#}").contains("proxy"));
    }
}
