//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Overrides `security.secret_key`.
pub const ENV_SECRET_KEY: &str = "SQLGATE_SECRET_KEY";
/// Overrides `security.basic_auth`.
pub const ENV_BASIC_AUTH: &str = "SQLGATE_BASIC_AUTH";
/// When set, a short secret key is accepted at startup.
pub const ENV_ALLOW_WEAK_SECRET: &str = "SQLGATE_ALLOW_WEAK_SECRET";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// API key secret and transport credential.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Query endpoints, one per database.
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `SQLGATE_*` overrides read through `lookup`.
    ///
    /// An override wins over the file, including an empty one, which clears
    /// the setting.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_SECRET_KEY) {
            self.security.secret_key = Some(secret).filter(|s| !s.is_empty());
        }
        if let Some(credential) = lookup(ENV_BASIC_AUTH) {
            self.security.basic_auth = Some(credential).filter(|s| !s.is_empty());
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for query endpoints (default: 127.0.0.1:8000).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_port: None,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Credentials.
#[derive(Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// HMAC secret for API keys. Without it every presented key is refused.
    pub secret_key: Option<String>,
    /// `username:password` for HTTP Basic.
    pub basic_auth: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("basic_auth", &self.basic_auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One query endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Route the endpoint is served on, e.g. `/sqlite/main`.
    pub route: String,
    /// SQLite database path, or `:memory:`.
    pub database: String,
    /// Require the HTTP Basic credential on this route.
    #[serde(default)]
    pub require_basic_auth: bool,
}
