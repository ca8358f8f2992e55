//! # Query Service
//!
//! Turns one client request into one cache lookup.
//!
//! The service never fails. Malformed parameters are defaulted or clamped (see
//! [`params`]) and an unavailable upstream yields the empty page
//! `{"transactions": [], "totalPages": 1}`, so dashboards keep rendering during
//! provider outages. It has no retry or caching logic of its own; both live below it.

pub mod params;

pub use params::{normalize_params, AdjustmentKind, NormalizedParams, Param, ParamAdjustment};

use crate::{cache::TransactionCache, metrics::MetricsCollector, types::TransactionsResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Query parameter defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Threshold used when the client sends none or an unparseable one. Defaults to `100`.
    #[serde(default = "default_threshold")]
    pub default_threshold: Decimal,
}

fn default_threshold() -> Decimal {
    Decimal::ONE_HUNDRED
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { default_threshold: default_threshold() }
    }
}

/// Serves `GET /api/whale-transactions` from the transaction cache.
#[derive(Clone)]
pub struct QueryService {
    cache: TransactionCache,
    config: QueryConfig,
    metrics: Arc<MetricsCollector>,
}

impl QueryService {
    #[must_use]
    pub fn new(
        cache: TransactionCache,
        config: QueryConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { cache, config, metrics }
    }

    /// Normalizes raw parameters, logging and counting every adjustment.
    #[must_use]
    pub fn normalize(
        &self,
        raw_page: Option<&str>,
        raw_threshold: Option<&str>,
    ) -> NormalizedParams {
        let params = normalize_params(raw_page, raw_threshold, self.config.default_threshold);

        for adjustment in &params.adjustments {
            debug!(
                param = adjustment.param.as_str(),
                kind = adjustment.kind.as_str(),
                raw = adjustment.raw.as_deref().unwrap_or(""),
                key = %params.key,
                "adjusted query parameter"
            );
            self.metrics
                .record_param_adjustment(adjustment.param.as_str(), adjustment.kind.as_str());
        }

        params
    }

    /// Returns one page of whale transactions at or above the requested threshold.
    pub async fn query(
        &self,
        raw_page: Option<&str>,
        raw_threshold: Option<&str>,
    ) -> TransactionsResponse {
        let params = self.normalize(raw_page, raw_threshold);

        match self.cache.get(params.key).await {
            Ok(page) => TransactionsResponse::from(page.as_ref()),
            Err(e) => {
                warn!(
                    key = %params.key,
                    attempts = e.attempts,
                    last_status = ?e.last_status,
                    error = %e,
                    "upstream unavailable, serving empty page"
                );
                self.metrics.record_degraded_response();
                TransactionsResponse::empty()
            }
        }
    }

    #[must_use]
    pub fn cache(&self) -> &TransactionCache {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }
}
