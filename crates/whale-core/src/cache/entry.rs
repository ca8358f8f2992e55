//! Cache slots and the snapshots they publish.

use crate::types::Page;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

/// Observable lifecycle state of one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// No page and no fetch in flight.
    Empty,
    /// No page yet, the first fetch is in flight.
    Warming,
    /// A page younger than the TTL is cached.
    Fresh,
    /// The cached page has outlived the TTL; it is still served.
    Stale,
}

impl EntryState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Warming => "warming",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

/// Immutable view of a committed fetch.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub page: Arc<Page>,
    pub fetched_at: Instant,
    pub version: u64,
}

impl Snapshot {
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// One cached key.
///
/// The snapshot is replaced as a whole, so readers see either the previous page or the
/// newly committed one.
#[derive(Debug)]
pub(crate) struct CacheSlot {
    snapshot: ArcSwap<Snapshot>,
    last_access: Mutex<Instant>,
}

impl CacheSlot {
    pub fn new(snapshot: Snapshot, now: Instant) -> Self {
        Self { snapshot: ArcSwap::from_pointee(snapshot), last_access: Mutex::new(now) }
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Publishes `snapshot` if it is newer than the current one.
    ///
    /// Callers serialize commits for a key by holding its map entry.
    pub fn publish(&self, snapshot: Snapshot) -> bool {
        if snapshot.version <= self.snapshot.load().version {
            return false;
        }
        self.snapshot.store(Arc::new(snapshot));
        true
    }

    pub fn touch(&self, now: Instant) {
        let mut last_access = self.last_access.lock();
        if now > *last_access {
            *last_access = now;
        }
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }
}
