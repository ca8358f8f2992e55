use crate::{
    metrics::MetricsCollector,
    types::{Page, PageKey},
    upstream::{
        http_client::{HttpClient, HttpClientConfig},
        normalize::normalize_body,
        TransactionSource, UpstreamConfig, UpstreamError, UpstreamUnavailable,
    },
};
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fetches and normalizes pages from the transaction provider.
///
/// Owns the retry loop: each attempt is a single request bounded by
/// `UpstreamConfig::timeout_ms`, transient failures are retried per
/// [`crate::upstream::RetryPolicy`], and everything else fails immediately.
pub struct UpstreamClient {
    http: HttpClient,
    endpoint: Url,
    config: UpstreamConfig,
    metrics: Arc<MetricsCollector>,
}

impl UpstreamClient {
    /// # Errors
    ///
    /// Returns [`UpstreamError::InvalidRequest`] if `base_url` and `path` do not form a valid
    /// URL, or [`UpstreamError::ConnectionFailed`] if the HTTP client cannot be built.
    pub fn new(
        config: UpstreamConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, UpstreamError> {
        let endpoint = Self::endpoint_url(&config)?;
        let http = HttpClient::with_config(HttpClientConfig {
            concurrent_limit: config.concurrent_limit,
            permit_timeout_ms: config.permit_timeout_ms,
            connect_timeout_ms: config.connect_timeout_ms,
        })?;

        Ok(Self { http, endpoint, config, metrics })
    }

    fn endpoint_url(config: &UpstreamConfig) -> Result<Url, UpstreamError> {
        let raw = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.path.trim_start_matches('/')
        );
        let url = Url::parse(&raw)
            .map_err(|e| UpstreamError::InvalidRequest(format!("invalid upstream url: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(UpstreamError::InvalidRequest(format!(
                "unsupported upstream scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Provider endpoint without query parameters.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Builds the provider URL for `key`.
    #[must_use]
    pub fn request_url(&self, key: &PageKey) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.config.page_param, &key.page().to_string());
            query.append_pair(&self.config.threshold_param, &key.threshold().to_string());
            if let Some(api_key) = &self.config.api_key {
                query.append_pair("api_key", api_key);
            }
        }
        url
    }

    async fn attempt(&self, key: &PageKey) -> Result<Page, UpstreamError> {
        let body = self.http.get(self.request_url(key), self.config.timeout()).await?;
        let normalized = normalize_body(*key, &body)?;

        for reason in &normalized.dropped {
            self.metrics.record_dropped_record(reason.as_str());
        }
        Ok(normalized.page)
    }

    /// Fetches one page, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamUnavailable`] once the retry budget is spent or on the first
    /// non-transient failure.
    pub async fn fetch_page(&self, key: &PageKey) -> Result<Page, UpstreamUnavailable> {
        let policy = &self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let started = Instant::now();
            let result = self.attempt(key).await;
            let latency = started.elapsed();

            match result {
                Ok(page) => {
                    self.metrics.record_upstream_attempt("success", latency);
                    debug!(
                        key = %key,
                        attempts,
                        transactions = page.transactions.len(),
                        total_pages = page.total_pages,
                        latency_ms = latency.as_millis(),
                        "upstream page fetched"
                    );
                    return Ok(page);
                }
                Err(err) => {
                    self.metrics.record_upstream_attempt(err.as_str(), latency);

                    if !err.is_transient() || !policy.should_retry(attempts) {
                        warn!(
                            key = %key,
                            attempts,
                            status = ?err.status(),
                            latency_ms = latency.as_millis(),
                            error = %err,
                            "upstream fetch failed"
                        );
                        return Err(UpstreamUnavailable::from_attempt(&err, attempts, latency));
                    }

                    let delay = policy.delay_for(attempts);
                    debug!(
                        key = %key,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "retrying upstream fetch"
                    );
                    self.metrics.record_upstream_retry(attempts, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl TransactionSource for UpstreamClient {
    async fn fetch_page(&self, key: &PageKey) -> Result<Page, UpstreamUnavailable> {
        UpstreamClient::fetch_page(self, key).await
    }
}
