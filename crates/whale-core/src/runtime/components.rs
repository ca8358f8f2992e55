//! Core component container for the whale feed runtime.

use crate::{
    cache::TransactionCache, metrics::MetricsCollector, middleware::RateLimiter,
    query::QueryService,
};
use std::sync::Arc;

/// Container for all initialized core components.
///
/// Everything here is cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct WhaleComponents {
    metrics_collector: Arc<MetricsCollector>,
    cache: TransactionCache,
    rate_limiter: Arc<RateLimiter>,
    query_service: Arc<QueryService>,
}

impl WhaleComponents {
    /// Called by `WhaleRuntimeBuilder` during initialization.
    #[must_use]
    pub fn new(
        metrics_collector: Arc<MetricsCollector>,
        cache: TransactionCache,
        rate_limiter: Arc<RateLimiter>,
        query_service: Arc<QueryService>,
    ) -> Self {
        Self { metrics_collector, cache, rate_limiter, query_service }
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn cache(&self) -> &TransactionCache {
        &self.cache
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    #[must_use]
    pub fn query_service(&self) -> &Arc<QueryService> {
        &self.query_service
    }
}
