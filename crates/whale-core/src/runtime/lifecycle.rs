//! Runtime lifecycle management including warm-up, background tasks and graceful
//! shutdown.

use crate::{
    cache::{TransactionCache, WarmUpReport},
    config::AppConfig,
    metrics::MetricsCollector,
    middleware::RateLimiter,
    query::QueryService,
    types::PageKey,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::WhaleRuntimeBuilder, WhaleComponents};

/// Main runtime container managing component lifecycles and background tasks.
///
/// Owns the cache, rate limiter and query service for the lifetime of the process.
/// Background tasks (cache maintenance, rate limiter cleanup) run until `shutdown()`
/// broadcasts on the shutdown channel, and are awaited before it returns.
pub struct WhaleRuntime {
    components: WhaleComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    warm_up_keys: Vec<PageKey>,
    background_tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    shutdown_initiated: AtomicBool,
}

impl WhaleRuntime {
    #[must_use]
    pub fn builder() -> WhaleRuntimeBuilder {
        WhaleRuntimeBuilder::new()
    }

    /// Called by `WhaleRuntimeBuilder` during initialization.
    pub(super) fn new(
        components: WhaleComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        warm_up_keys: Vec<PageKey>,
        enable_cache_maintenance: bool,
        enable_rate_limit_cleanup: bool,
    ) -> Self {
        let mut background_tasks = Vec::with_capacity(2);

        if enable_cache_maintenance {
            let handle = components.cache().start_maintenance_task(
                config.cache.maintenance_interval(),
                shutdown_tx.subscribe(),
            );
            debug!(
                interval_secs = config.cache.maintenance_interval_seconds,
                "cache maintenance task started"
            );
            background_tasks.push(("cache maintenance", handle));
        }

        if enable_rate_limit_cleanup {
            let handle = components.rate_limiter().start_cleanup_task(
                Arc::clone(components.metrics_collector()),
                shutdown_tx.subscribe(),
            );
            debug!("rate limiter cleanup task started");
            background_tasks.push(("rate limiter cleanup", handle));
        }

        Self {
            components,
            shutdown_tx,
            config,
            warm_up_keys,
            background_tasks: Mutex::new(background_tasks),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    /// Fetches and pins the configured warm-up keys.
    ///
    /// Bounded by `cache.warm_up_timeout_seconds`. On timeout the fetches keep running
    /// in the background and `None` is returned; nothing here fails startup.
    pub async fn warm_up(&self) -> Option<WarmUpReport> {
        if self.warm_up_keys.is_empty() {
            debug!("no warm-up keys configured");
            return Some(WarmUpReport::default());
        }

        let timeout = self.config.cache.warm_up_timeout();
        match tokio::time::timeout(timeout, self.cache().warm_up(&self.warm_up_keys)).await {
            Ok(report) => {
                if !report.is_complete() {
                    warn!(
                        failed = report.failed.len(),
                        "some warm-up keys failed, they will be fetched on first request"
                    );
                }
                Some(report)
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    keys = self.warm_up_keys.len(),
                    "cache warm-up timed out, continuing startup"
                );
                None
            }
        }
    }

    #[must_use]
    pub fn components(&self) -> &WhaleComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn warm_up_keys(&self) -> &[PageKey] {
        &self.warm_up_keys
    }

    #[must_use]
    pub fn cache(&self) -> &TransactionCache {
        self.components.cache()
    }

    #[must_use]
    pub fn query_service(&self) -> &Arc<QueryService> {
        self.components.query_service()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.components.rate_limiter()
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        self.components.metrics_collector()
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates graceful shutdown of all background tasks and waits for them.
    ///
    /// Idempotent: a second call logs and returns.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("initiating whale feed runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "failed to send shutdown signal (no receivers)");
        }

        let tasks = std::mem::take(&mut *self.background_tasks.lock());
        for (name, task) in tasks {
            match task.await {
                Ok(()) => debug!(task = name, "background task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "background task cancelled"),
                Err(e) => error!(task = name, error = %e, "background task failed"),
            }
        }

        info!("whale feed runtime shutdown complete");
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<WhaleRuntime>;
    let _ = assert_sync::<WhaleRuntime>;
};
