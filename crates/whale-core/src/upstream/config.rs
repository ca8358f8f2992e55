use crate::upstream::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the transaction provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Provider base URL, e.g. `https://api.example.com/v1`. Must be `http` or `https`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Listing path appended to `base_url`. Defaults to `/transactions`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Query parameter carrying the page number. Defaults to `page`.
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Query parameter carrying the minimum value. Defaults to `min_value`.
    #[serde(default = "default_threshold_param")]
    pub threshold_param: String,

    /// Sent as the `api_key` query parameter when set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Hard timeout per attempt in milliseconds. Defaults to `5000`.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds. Defaults to `3000`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum concurrent provider requests. Defaults to `32`.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    /// Maximum wait for a concurrency permit in milliseconds. Defaults to `500`.
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.whale-alert.io/v1".to_string()
}

fn default_path() -> String {
    "/transactions".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_threshold_param() -> String {
    "min_value".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_concurrent_limit() -> usize {
    32
}

fn default_permit_timeout_ms() -> u64 {
    500
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_path(),
            page_param: default_page_param(),
            threshold_param: default_threshold_param(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            concurrent_limit: default_concurrent_limit(),
            permit_timeout_ms: default_permit_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl UpstreamConfig {
    /// Config pointing at `base_url` with every other field defaulted.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
