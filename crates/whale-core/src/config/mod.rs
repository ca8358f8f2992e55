//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and `#[serde(default)]` functions
//! 2. **Config file**: TOML file specified by the `WHALE_CONFIG` env var
//!    (`config/config.toml` when unset, optional)
//! 3. **Environment variables**: `WHALE__*` env vars override specific fields
//! 4. **`PORT`**: a bare `PORT` env var overrides `server.bind_port`
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP listener
//! - [`UpstreamConfig`]: transaction provider endpoint, timeouts and retry policy
//! - [`TransactionCacheConfig`]: TTL, eviction and warm-up keys
//! - [`RateLimitConfig`]: per-client admission ceiling
//! - [`QueryConfig`]: parameter defaults
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 3000
//!
//! [upstream]
//! base_url = "https://api.whale-alert.io/v1"
//! timeout_ms = 5000
//!
//! [upstream.retry]
//! max_attempts = 3
//!
//! [cache]
//! ttl_seconds = 60
//! warm_up_keys = ["1:100", "1:1000"]
//!
//! [rate_limit]
//! ceiling = 60
//! window_seconds = 60
//! ```
//!
//! The warm-up key list can also be set from the environment as a comma-separated
//! string: `WHALE__CACHE__WARM_UP_KEYS="1:100,2:100"`.

use crate::{
    cache::{CacheError, TransactionCacheConfig},
    middleware::RateLimitConfig,
    query::QueryConfig,
    upstream::UpstreamConfig,
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path};
use thiserror::Error;
use url::Url;

/// Fatal startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ConfigurationError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to `"127.0.0.1"`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on. Defaults to `3000`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), bind_port: default_bind_port() }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: TransactionCacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `WHALE__` prefix can override any configuration
    /// value. Use `__` as a separator for nested fields (e.g.,
    /// `WHALE__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Load`] if the file cannot be read, parsed, or
    /// deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigurationError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", default_bind_address())?
            .set_default("server.bind_port", i64::from(default_bind_port()))?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("WHALE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cache.warm_up_keys"),
            )
            .build()?;

        let mut config: Self = config_builder.try_deserialize()?;
        config.apply_port_override(std::env::var("PORT").ok().as_deref())?;
        Ok(config)
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `WHALE_CONFIG` environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigurationError> {
        let config_path =
            std::env::var("WHALE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    fn apply_port_override(&mut self, port: Option<&str>) -> Result<(), ConfigurationError> {
        let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        self.server.bind_port = port
            .parse()
            .map_err(|_| ConfigurationError::invalid("PORT", format!("`{port}` is not a port")))?;
        Ok(())
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigurationError> {
        let addr = format!("{}:{}", self.server.bind_address, self.server.bind_port);
        addr.parse().map_err(|_| {
            ConfigurationError::invalid(
                "server.bind_address",
                format!("{addr} is not a socket address"),
            )
        })
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Checks include:
    /// - The upstream base URL is an absolute `http(s)` URL
    /// - Durations, ceilings and attempt budgets are greater than zero
    /// - Every warm-up key parses as `page:threshold`
    /// - Logging format is either `"json"` or `"pretty"`
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.server.bind_port == 0 {
            return Err(ConfigurationError::invalid("server.bind_port", "must be greater than 0"));
        }
        self.socket_addr()?;

        let base_url = self.upstream.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigurationError::invalid("upstream.base_url", "must not be empty"));
        }
        match Url::parse(base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigurationError::invalid(
                    "upstream.base_url",
                    format!("unsupported scheme `{}`", url.scheme()),
                ));
            }
            Err(e) => {
                return Err(ConfigurationError::invalid("upstream.base_url", e.to_string()));
            }
        }

        if self.upstream.timeout_ms == 0 {
            return Err(ConfigurationError::invalid(
                "upstream.timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.upstream.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid(
                "upstream.retry.max_attempts",
                "must be greater than 0",
            ));
        }

        if self.upstream.concurrent_limit == 0 {
            return Err(ConfigurationError::invalid(
                "upstream.concurrent_limit",
                "must be greater than 0",
            ));
        }

        self.cache.validate()?;

        if self.rate_limit.ceiling == 0 {
            return Err(ConfigurationError::invalid("rate_limit.ceiling", "must be greater than 0"));
        }

        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigurationError::invalid(
                "rate_limit.window_seconds",
                "must be greater than 0",
            ));
        }

        if self.rate_limit.max_identities == 0 {
            return Err(ConfigurationError::invalid(
                "rate_limit.max_identities",
                "must be greater than 0",
            ));
        }

        if self.query.default_threshold < rust_decimal::Decimal::ZERO {
            return Err(ConfigurationError::invalid(
                "query.default_threshold",
                "must not be negative",
            ));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(ConfigurationError::invalid("logging.format", "must be 'json' or 'pretty'"));
        }

        Ok(())
    }
}
