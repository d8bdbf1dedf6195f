//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.janus-client/config.json`) and environment.

use crate::gateway::{GatewayOptions, OverflowPolicy, ProtocolVariant};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level client config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where the Janus server listens.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Keepalive, ping and reply deadlines.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Per-session and per-handle event queues.
    #[serde(default)]
    pub event_queue: EventQueueConfig,
}

/// Janus endpoints and admin credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Janus WebSocket URL (default "ws://127.0.0.1:8188"). Overridden by JANUS_URL env.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Admin API WebSocket URL (default "ws://127.0.0.1:7188"). Overridden by JANUS_ADMIN_URL env.
    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    /// Overridden by JANUS_ADMIN_SECRET env.
    pub admin_secret: Option<String>,
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:8188".to_string()
}

fn default_admin_url() -> String {
    "ws://127.0.0.1:7188".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            admin_url: default_admin_url(),
            admin_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    /// WebSocket ping interval (default 30).
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Session keepalive interval (default 20). Janus reaps idle sessions after 60s.
    #[serde(default = "default_session_keep_alive_secs")]
    pub session_keep_alive_secs: u64,

    /// Reply deadline per request (default 30); 0 waits forever.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long an acked transaction stays registered for its follow-up event (default 60).
    #[serde(default = "default_used_linger_secs")]
    pub used_linger_secs: u64,
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_session_keep_alive_secs() -> u64 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_used_linger_secs() -> u64 {
    60
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            session_keep_alive_secs: default_session_keep_alive_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            used_linger_secs: default_used_linger_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQueueConfig {
    /// Events buffered per session or handle (default 64).
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// What a full queue does with a new event.
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl Config {
    /// Connection options for [`Gateway::connect_with`](crate::gateway::Gateway::connect_with).
    pub fn gateway_options(&self) -> GatewayOptions {
        let t = &self.timing;
        GatewayOptions {
            ping_interval: Duration::from_secs(t.ping_interval_secs.max(1)),
            request_timeout: (t.request_timeout_secs > 0)
                .then(|| Duration::from_secs(t.request_timeout_secs)),
            used_linger: Duration::from_secs(t.used_linger_secs),
            queue_capacity: self.event_queue.capacity.max(1),
            overflow: self.event_queue.overflow,
        }
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.timing.session_keep_alive_secs.max(1))
    }

    /// Admin variant with the resolved secret, if one is configured.
    pub fn admin_variant(&self) -> Option<ProtocolVariant> {
        resolve_admin_secret(self).map(|secret| ProtocolVariant::Admin { secret })
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Janus URL: env JANUS_URL overrides config.
pub fn resolve_gateway_url(config: &Config) -> String {
    env_override("JANUS_URL").unwrap_or_else(|| config.gateway.url.clone())
}

/// Resolve the admin URL: env JANUS_ADMIN_URL overrides config.
pub fn resolve_admin_url(config: &Config) -> String {
    env_override("JANUS_ADMIN_URL").unwrap_or_else(|| config.gateway.admin_url.clone())
}

/// Resolve the admin secret: env JANUS_ADMIN_SECRET overrides config.
pub fn resolve_admin_secret(config: &Config) -> Option<String> {
    env_override("JANUS_ADMIN_SECRET").or_else(|| {
        config
            .gateway
            .admin_secret
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("JANUS_CLIENT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".janus-client").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from `path`, else the default path (or JANUS_CLIENT_CONFIG). Missing file =>
/// default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gateway_options() {
        let config = Config::default();
        let opts = config.gateway_options();
        let defaults = GatewayOptions::default();
        assert_eq!(opts.ping_interval, defaults.ping_interval);
        assert_eq!(opts.request_timeout, defaults.request_timeout);
        assert_eq!(opts.used_linger, defaults.used_linger);
        assert_eq!(opts.queue_capacity, defaults.queue_capacity);
        assert_eq!(opts.overflow, defaults.overflow);
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(20));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"gateway":{"url":"ws://janus:8188"},"timing":{"requestTimeoutSecs":0},"eventQueue":{"overflow":"block"}}"#,
        )
        .unwrap();
        assert_eq!(config.gateway.url, "ws://janus:8188");
        assert_eq!(config.gateway.admin_url, "ws://127.0.0.1:7188");
        assert_eq!(config.timing.ping_interval_secs, 30);
        let opts = config.gateway_options();
        assert_eq!(opts.request_timeout, None);
        assert_eq!(opts.overflow, OverflowPolicy::Block);
        assert_eq!(opts.queue_capacity, 64);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("janus-client-test-missing").join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.url, "ws://127.0.0.1:8188");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("janus-client-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn blank_admin_secret_is_ignored() {
        let mut config = Config::default();
        config.gateway.admin_secret = Some("  ".into());
        if std::env::var("JANUS_ADMIN_SECRET").is_err() {
            assert!(config.admin_variant().is_none());
        }
    }
}
