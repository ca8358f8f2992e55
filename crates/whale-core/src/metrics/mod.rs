//! # Metrics
//!
//! Prometheus counters, gauges and histograms for the feed's serving path.
//!
//! All recording goes through the global `metrics` recorder, which is installed
//! once per process. Recording is lock-free; rendering happens only when `/metrics`
//! is scraped.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `whale_cache_lookups_total` | counter | `outcome` |
//! | `whale_cache_refreshes_total` | counter | `result` |
//! | `whale_cache_evictions_total` | counter | `reason` |
//! | `whale_cache_entries` | gauge | |
//! | `whale_cache_inflight_fetches` | gauge | |
//! | `whale_upstream_attempts_total` | counter | `outcome` |
//! | `whale_upstream_attempt_duration_seconds` | histogram | |
//! | `whale_upstream_retries_total` | counter | `attempt` |
//! | `whale_upstream_dropped_records_total` | counter | `reason` |
//! | `whale_rate_limit_decisions_total` | counter | `decision` |
//! | `whale_rate_limit_identities` | gauge | |
//! | `whale_query_param_adjustments_total` | counter | `param`, `kind` |
//! | `whale_query_degraded_responses_total` | counter | |

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{sync::OnceLock, time::Duration};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to install global prometheus recorder, metrics will not be rendered"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Static label for a [`crate::cache::TransactionCache`] lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Served from a fresh entry.
    Hit,
    /// Served from a stale entry while a refresh runs in the background.
    Stale,
    /// No entry; this caller started the fetch.
    Miss,
    /// No entry; this caller joined a fetch already in flight.
    Coalesced,
}

impl LookupOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stale => "stale",
            Self::Miss => "miss",
            Self::Coalesced => "coalesced",
        }
    }
}

/// Handle for recording feed metrics and rendering the Prometheus exposition.
///
/// Cheap to construct; every instance shares the process-wide recorder.
#[derive(Clone)]
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    pub fn record_cache_lookup(&self, outcome: LookupOutcome) {
        counter!("whale_cache_lookups_total", "outcome" => outcome.as_str()).increment(1);
    }

    pub fn record_cache_refresh(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        counter!("whale_cache_refreshes_total", "result" => result).increment(1);
    }

    pub fn record_cache_eviction(&self, reason: &'static str, evicted: usize) {
        if evicted > 0 {
            counter!("whale_cache_evictions_total", "reason" => reason).increment(evicted as u64);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_cache_size(&self, entries: usize, inflight: usize) {
        gauge!("whale_cache_entries").set(entries as f64);
        gauge!("whale_cache_inflight_fetches").set(inflight as f64);
    }

    pub fn record_upstream_attempt(&self, outcome: &'static str, latency: Duration) {
        counter!("whale_upstream_attempts_total", "outcome" => outcome).increment(1);
        histogram!("whale_upstream_attempt_duration_seconds").record(latency.as_secs_f64());
    }

    pub fn record_upstream_retry(&self, attempt: u32, delay: Duration) {
        counter!("whale_upstream_retries_total", "attempt" => attempt.to_string()).increment(1);
        histogram!("whale_upstream_retry_delay_seconds").record(delay.as_secs_f64());
    }

    pub fn record_dropped_record(&self, reason: &'static str) {
        counter!("whale_upstream_dropped_records_total", "reason" => reason).increment(1);
    }

    pub fn record_rate_limit(&self, admitted: bool) {
        let decision = if admitted { "admitted" } else { "rejected" };
        counter!("whale_rate_limit_decisions_total", "decision" => decision).increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_rate_limit_identities(&self, count: usize) {
        gauge!("whale_rate_limit_identities").set(count as f64);
    }

    pub fn record_param_adjustment(&self, param: &'static str, kind: &'static str) {
        counter!("whale_query_param_adjustments_total", "param" => param, "kind" => kind)
            .increment(1);
    }

    pub fn record_degraded_response(&self) {
        counter!("whale_query_degraded_responses_total").increment(1);
    }

    /// Renders the Prometheus text exposition.
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}
