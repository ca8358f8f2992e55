//! Provider mock for the whale transaction feed.
//!
//! Wraps mockito and speaks the default provider wire contract: `GET /transactions`
//! with `page` and `min_value` query parameters.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::Value;
use whale_core::upstream::{RetryPolicy, UpstreamConfig};

/// Listing path the mock serves.
pub const TRANSACTIONS_PATH: &str = "/transactions";

/// Builder for provider mocks.
pub struct UpstreamMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
}

impl UpstreamMockBuilder {
    /// Creates a new mock builder with a fresh mockito server.
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new() }
    }

    /// Returns the URL of the mock server.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Upstream config pointing at this server with millisecond backoff.
    #[must_use]
    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            timeout_ms: 2_000,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
                jitter_factor: 0.0,
            },
            ..UpstreamConfig::with_base_url(self.url())
        }
    }

    fn page_matcher(page: u32, min_value: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".to_string(), page.to_string()),
            Matcher::UrlEncoded("min_value".to_string(), min_value.to_string()),
        ])
    }

    /// Serves `body` for one `(page, min_value)` pair, expecting `hits` requests.
    pub async fn mock_page(
        &mut self,
        page: u32,
        min_value: &str,
        body: &Value,
        hits: usize,
    ) -> &mut Self {
        let mock = self
            .server
            .mock("GET", TRANSACTIONS_PATH)
            .match_query(Self::page_matcher(page, min_value))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Serves `body` for every listing request, expecting at least one.
    pub async fn mock_any_page(&mut self, body: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("GET", TRANSACTIONS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect_at_least(1)
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Answers every listing request with `status`, expecting exactly `hits` requests.
    pub async fn mock_status(&mut self, status: usize, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("GET", TRANSACTIONS_PATH)
            .match_query(Matcher::Any)
            .with_status(status)
            .with_body("provider error")
            .expect(hits)
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Answers every listing request with a raw, possibly malformed, body.
    pub async fn mock_raw_body(&mut self, body: &str, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("GET", TRANSACTIONS_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Asserts that every registered mock saw its expected number of requests.
    pub async fn assert_all(&self) {
        for mock in &self.mocks {
            mock.assert_async().await;
        }
    }
}
