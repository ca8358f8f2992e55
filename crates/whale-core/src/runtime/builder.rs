//! Builder for initializing the whale feed runtime.

use crate::{
    cache::{CacheError, TransactionCache},
    config::{AppConfig, ConfigurationError},
    metrics::MetricsCollector,
    middleware::RateLimiter,
    query::QueryService,
    upstream::{TransactionSource, UpstreamClient, UpstreamError},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::WhaleRuntime, WhaleComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("No configuration provided")]
    MissingConfig,

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(#[from] ConfigurationError),

    #[error("Upstream client initialization failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Cache initialization failed: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Clone)]
struct RuntimeOptions {
    shutdown_channel_capacity: usize,
    enable_cache_maintenance: bool,
    enable_rate_limit_cleanup: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            shutdown_channel_capacity: 16,
            enable_cache_maintenance: true,
            enable_rate_limit_cleanup: true,
        }
    }
}

/// Builder for constructing a [`WhaleRuntime`].
///
/// Must be built inside a tokio runtime; background tasks are spawned by `build`.
///
/// # Examples
///
/// ```no_run
/// # use whale_core::{config::AppConfig, runtime::WhaleRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
///
/// let runtime = WhaleRuntimeBuilder::new().with_config(config).build()?;
/// runtime.warm_up().await;
/// # Ok(())
/// # }
/// ```
pub struct WhaleRuntimeBuilder {
    config: Option<AppConfig>,
    source: Option<Arc<dyn TransactionSource>>,
    options: RuntimeOptions,
}

impl WhaleRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, source: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the HTTP upstream client with another transaction source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn TransactionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn disable_cache_maintenance(mut self) -> Self {
        self.options.enable_cache_maintenance = false;
        self
    }

    #[must_use]
    pub fn disable_rate_limit_cleanup(mut self) -> Self {
        self.options.enable_rate_limit_cleanup = false;
        self
    }

    /// Builds the runtime, initializing all components and starting background tasks.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if configuration is missing or invalid, or a component
    /// rejects its configuration.
    pub fn build(self) -> Result<WhaleRuntime, RuntimeError> {
        let config = self.config.ok_or(RuntimeError::MissingConfig)?;
        config.validate()?;
        let warm_up_keys = config.cache.parsed_warm_up_keys()?;

        info!(
            upstream = %config.upstream.base_url,
            warm_up_keys = warm_up_keys.len(),
            rate_limit_ceiling = config.rate_limit.ceiling,
            rate_limit_window_secs = config.rate_limit.window_seconds,
            "initializing whale feed runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let metrics_collector = Arc::new(MetricsCollector::new());
        debug!("metrics collector initialized");

        let source: Arc<dyn TransactionSource> = match self.source {
            Some(source) => {
                debug!("using injected transaction source");
                source
            }
            None => {
                let client =
                    UpstreamClient::new(config.upstream.clone(), metrics_collector.clone())?;
                debug!(endpoint = %client.endpoint(), "upstream client initialized");
                Arc::new(client)
            }
        };

        let cache = TransactionCache::new(&config.cache, source, metrics_collector.clone())?;
        debug!(
            ttl_secs = config.cache.ttl_seconds,
            max_entries = config.cache.max_entries,
            "transaction cache initialized"
        );

        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        debug!("rate limiter initialized");

        let query_service = Arc::new(QueryService::new(
            cache.clone(),
            config.query.clone(),
            metrics_collector.clone(),
        ));

        let components =
            WhaleComponents::new(metrics_collector, cache, rate_limiter, query_service);
        let runtime = WhaleRuntime::new(
            components,
            shutdown_tx,
            config,
            warm_up_keys,
            self.options.enable_cache_maintenance,
            self.options.enable_rate_limit_cleanup,
        );

        info!("whale feed runtime initialization complete");

        Ok(runtime)
    }
}

impl Default for WhaleRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
