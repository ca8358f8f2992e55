use reqwest::{Client, ClientBuilder, Url};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use crate::upstream::UpstreamError;

const MAX_ERROR_BODY_LEN: usize = 256;

/// Connection and concurrency settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum number of concurrent provider requests.
    pub concurrent_limit: usize,
    /// How long an attempt may wait for a concurrency permit, in milliseconds.
    pub permit_timeout_ms: u64,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { concurrent_limit: 32, permit_timeout_ms: 500, connect_timeout_ms: 3000 }
    }
}

/// Pooled HTTP client with semaphore-based concurrency control.
///
/// Performs exactly one request per call. Retrying is the caller's decision.
pub struct HttpClient {
    client: Client,
    permits: Arc<Semaphore>,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Creates a client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.concurrent_limit.max(1))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(concat!("whale-feed/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.concurrent_limit.max(1))),
            config,
        })
    }

    /// Maps a transport failure to an attempt error. The message names the failing
    /// phase only, never the URL, since the URL may carry the API key.
    fn classify(error: &reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            return UpstreamError::Timeout;
        }

        let phase = if error.is_connect() {
            "connect"
        } else if error.is_redirect() {
            "redirect"
        } else if error.is_body() || error.is_decode() {
            "response body"
        } else {
            "request"
        };
        UpstreamError::ConnectionFailed(format!("{phase} failed"))
    }

    /// Cuts an error body to at most `MAX_ERROR_BODY_LEN` bytes on a char boundary.
    fn truncate_body(mut body: String) -> String {
        if body.len() > MAX_ERROR_BODY_LEN {
            let cut =
                (0..=MAX_ERROR_BODY_LEN).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
            body.truncate(cut);
            body.push_str("... (truncated)");
        }
        body
    }

    /// Sends a single `GET` and returns the body of a 2xx response.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::ConcurrencyLimit`] if no permit is available within the permit timeout
    /// - [`UpstreamError::Timeout`] if the request exceeds `timeout`
    /// - [`UpstreamError::HttpError`] for non-success HTTP status codes
    /// - [`UpstreamError::ConnectionFailed`] for other network failures
    pub async fn get(&self, url: Url, timeout: Duration) -> Result<bytes::Bytes, UpstreamError> {
        let permit_wait = Duration::from_millis(self.config.permit_timeout_ms);
        let Ok(Ok(_permit)) =
            tokio::time::timeout(permit_wait, Arc::clone(&self.permits).acquire_owned()).await
        else {
            tracing::warn!(
                available_permits = self.permits.available_permits(),
                "upstream permit acquisition timeout"
            );
            return Err(UpstreamError::ConcurrencyLimit);
        };

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::HttpError(status.as_u16(), Self::truncate_body(body)));
        }

        response.bytes().await.map_err(|e| Self::classify(&e))
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
