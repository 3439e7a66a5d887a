//! Configuration loading, validation, and management for the pairwire
//! broker.
//!
//! Loads from `~/.pairwire/config.toml` with `PAIRWIRE_*` environment
//! variable overrides. Validated once at startup so a bad deployment fails
//! fast rather than misbehaving at the first connection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure. Maps directly to `~/.pairwire/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub pairing: PairingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "<empty>" } else { "[REDACTED]" }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("gateway", &self.gateway)
            .field("cors", &self.cors)
            .field("auth", &self.auth)
            .field("store", &self.store)
            .field("pairing", &self.pairing)
            .finish()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("app_token_secret", &redact(&self.app_token_secret))
            .field("runner_credentials", &self.runner_credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Network binding and WebSocket keepalive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// How often the gateway pings idle sockets to detect a dead peer.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// How long a socket may go without a pong before it's dropped.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    /// Binding to a non-loopback host requires this to be explicitly set —
    /// a broker with unauthenticated defaults should not be reachable from
    /// the network by accident.
    #[serde(default)]
    pub allow_public_bind: bool,
}

fn default_port() -> u16 {
    7070
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_ping_interval_secs() -> u64 {
    25
}
fn default_ping_timeout_secs() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            allow_public_bind: false,
        }
    }
}

/// Cross-origin policy for the `/ws/app` and `/health` routes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// Empty means "allow any origin" — fine for a broker that authenticates
    /// every socket anyway, but configurable for deployments behind a
    /// specific web app's domain.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Credentials checked by component A: the app bearer-token secret and the
/// static table of runner `{id, secret}` pairs.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub app_token_secret: String,

    #[serde(default)]
    pub runner_credentials: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { app_token_secret: String::new(), runner_credentials: HashMap::new() }
    }
}

/// Which shared-store backend to use. Only `"memory"` exists today; the
/// field exists so a networked backend can be selected without changing the
/// shape of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_store_backend() }
    }
}

/// Tunable parameters for components D–G: pairing-code lifetime, runner
/// liveness, rate limiting, and history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,

    #[serde(default = "default_heartbeat_ttl_secs")]
    pub heartbeat_ttl_secs: u64,

    #[serde(default = "default_heartbeat_online_grace_secs")]
    pub heartbeat_online_grace_secs: u64,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_rate_limit_max_failures")]
    pub rate_limit_max_failures: u64,

    #[serde(default = "default_rate_limit_ban_secs")]
    pub rate_limit_ban_secs: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_code_ttl_secs() -> u64 {
    600
}
fn default_heartbeat_ttl_secs() -> u64 {
    60
}
fn default_heartbeat_online_grace_secs() -> u64 {
    30
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_rate_limit_max_failures() -> u64 {
    5
}
fn default_rate_limit_ban_secs() -> u64 {
    300
}
fn default_history_capacity() -> usize {
    100
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl_secs(),
            heartbeat_ttl_secs: default_heartbeat_ttl_secs(),
            heartbeat_online_grace_secs: default_heartbeat_online_grace_secs(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max_failures: default_rate_limit_max_failures(),
            rate_limit_ban_secs: default_rate_limit_ban_secs(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            cors: CorsConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            pairing: PairingConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from the default path (`~/.pairwire/config.toml`),
    /// then apply `PAIRWIRE_*` environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(secret) = std::env::var("PAIRWIRE_APP_TOKEN_SECRET") {
            config.auth.app_token_secret = secret;
        }
        if let Ok(host) = std::env::var("PAIRWIRE_HOST") {
            config.gateway.host = host;
        }
        if let Ok(port) = std::env::var("PAIRWIRE_PORT") {
            config.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("PAIRWIRE_PORT '{port}' is not a valid port"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, falling back to
    /// defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("no config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError { path: path.to_path_buf(), reason: e.to_string() })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError { path: path.to_path_buf(), reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".pairwire")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.app_token_secret.is_empty() {
            return Err(ConfigError::ValidationError("auth.app_token_secret must not be empty".into()));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be nonzero".into()));
        }
        if let Some((runner_id, _)) = self.auth.runner_credentials.iter().find(|(_, secret)| secret.is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "auth.runner_credentials['{runner_id}'] must not be empty"
            )));
        }
        if !self.gateway.allow_public_bind && !is_loopback_host(&self.gateway.host) {
            return Err(ConfigError::ValidationError(format!(
                "gateway.host '{}' is not loopback; set gateway.allow_public_bind = true to allow it",
                self.gateway.host
            )));
        }
        Ok(())
    }

    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "::1")
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BrokerConfig {
        BrokerConfig { auth: AuthConfig { app_token_secret: "s3cr3t".into(), ..Default::default() }, ..Default::default() }
    }

    #[test]
    fn default_config_has_expected_pairing_parameters() {
        let config = BrokerConfig::default();
        assert_eq!(config.pairing.code_ttl_secs, 600);
        assert_eq!(config.pairing.rate_limit_max_failures, 5);
        assert_eq!(config.gateway.host, "127.0.0.1");
    }

    #[test]
    fn empty_app_token_secret_is_rejected() {
        assert!(BrokerConfig::default().validate().is_err());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = valid_config();
        config.gateway.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_runner_secret_is_rejected() {
        let mut config = valid_config();
        config.auth.runner_credentials.insert("R1".into(), String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn public_bind_without_opt_in_is_rejected() {
        let mut config = valid_config();
        config.gateway.host = "0.0.0.0".into();
        assert!(config.validate().is_err());
        config.gateway.allow_public_bind = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = valid_config();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: BrokerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.auth.app_token_secret, config.auth.app_token_secret);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn load_from_missing_path_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let config = BrokerConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 7070);
    }

    #[test]
    fn load_from_existing_file_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml::to_string_pretty(&valid_config()).unwrap()).unwrap();
        let config = BrokerConfig::load_from(&path).unwrap();
        assert_eq!(config.auth.app_token_secret, "s3cr3t");
    }
}
