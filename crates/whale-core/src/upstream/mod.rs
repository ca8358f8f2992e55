//! Transaction provider access.
//!
//! This module is the resilience boundary between the feed and the external
//! provider:
//! - [`HttpClient`] issues single pooled requests under a concurrency limit
//! - [`normalize`] turns lenient provider JSON into [`Page`]s, dropping bad records
//! - [`UpstreamClient`] runs the retry loop driven by a [`RetryPolicy`]
//!
//! Callers see the provider only through [`TransactionSource`], which fails with a
//! single [`UpstreamUnavailable`] once resilience is exhausted.
//!
//! ```text
//! fetch_page(key)
//!      │
//!      ▼
//! ┌──────────────┐  transient  ┌───────────────┐
//! │   attempt    │ ──────────► │ backoff+jitter│ ──┐
//! │ GET + decode │             └───────────────┘   │
//! └──────┬───────┘ ◄─────────────────────────────── ┘
//!        │ ok / non-transient / budget spent
//!        ▼
//!  Page or UpstreamUnavailable
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod http_client;
pub mod normalize;
pub mod retry;

pub use client::UpstreamClient;
pub use config::UpstreamConfig;
pub use errors::{UpstreamError, UpstreamUnavailable};
pub use http_client::{HttpClient, HttpClientConfig};
pub use normalize::{DropReason, Normalized};
pub use retry::RetryPolicy;

use crate::types::{Page, PageKey};
use async_trait::async_trait;

/// Anything that can produce one page of the transaction feed.
///
/// Implementations own their resilience. A returned error means the page is
/// unavailable right now, not that the caller should retry.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// # Errors
    ///
    /// Returns [`UpstreamUnavailable`] when no page could be produced.
    async fn fetch_page(&self, key: &PageKey) -> Result<Page, UpstreamUnavailable>;
}
