//! In-flight fetch registry entries and the guard that retires them.
//!
//! # Protocol
//!
//! ```text
//! join_or_start(key)
//!     │
//!     ├─ inflight[key] live ──────────► clone Shared handle (coalesced)
//!     │
//!     └─ vacant or abandoned
//!           │
//!           ├─ entries[key] fresh ────► return cached page (double-check)
//!           │
//!           └─ spawn fetch task, insert InflightFetch
//!                      │
//!                      ▼
//!              fetch → commit → FetchGuard::drop removes inflight[key]
//! ```
//!
//! The commit happens before the guard drops, so a key is never observed with neither
//! a page nor an in-flight fetch while a fetch is completing.

use crate::{
    types::{Page, PageKey},
    upstream::UpstreamUnavailable,
};
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use tokio::time::Instant;

pub(crate) type FetchResult = Result<Arc<Page>, UpstreamUnavailable>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// A fetch currently running for one key.
#[derive(Clone)]
pub(crate) struct InflightFetch {
    pub future: SharedFetch,
    pub started_at: Instant,
    pub version: u64,
}

/// RAII guard held by a fetch task. Dropping it deregisters the fetch, whether the
/// task returned, failed or panicked.
///
/// Only the registration with the guard's own version is removed, so a fetch that was
/// superseded never deregisters its replacement.
pub(crate) struct FetchGuard {
    inflight: Arc<DashMap<PageKey, InflightFetch>>,
    key: PageKey,
    version: u64,
}

impl FetchGuard {
    pub fn new(inflight: Arc<DashMap<PageKey, InflightFetch>>, key: PageKey, version: u64) -> Self {
        Self { inflight, key, version }
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        let version = self.version;
        self.inflight.remove_if(&self.key, |_, fetch| fetch.version == version);
        tracing::trace!(key = %self.key, version, "fetch guard dropped");
    }
}
