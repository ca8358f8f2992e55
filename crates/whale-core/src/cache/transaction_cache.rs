use crate::{
    cache::{
        config::{CacheError, TransactionCacheConfig},
        entry::{CacheSlot, EntryState, Snapshot},
        inflight::{FetchGuard, FetchResult, InflightFetch, SharedFetch},
    },
    metrics::{LookupOutcome, MetricsCollector},
    types::{Page, PageKey},
    upstream::{TransactionSource, UpstreamUnavailable},
};
use dashmap::{mapref::entry::Entry, DashMap, DashSet};
use futures::FutureExt;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// Point-in-time counters of the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub pinned: usize,
    pub inflight: usize,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub refresh_failures: u64,
    pub evictions: u64,
}

/// Outcome of [`TransactionCache::warm_up`].
#[derive(Debug, Clone, Default)]
pub struct WarmUpReport {
    pub succeeded: Vec<PageKey>,
    pub failed: Vec<(PageKey, UpstreamUnavailable)>,
}

impl WarmUpReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    refresh_failures: AtomicU64,
    evictions: AtomicU64,
}

enum Join {
    Cached(Arc<Page>),
    Fetch { future: SharedFetch, started: bool },
}

struct Inner {
    source: Arc<dyn TransactionSource>,
    entries: DashMap<PageKey, Arc<CacheSlot>>,
    inflight: Arc<DashMap<PageKey, InflightFetch>>,
    pinned: DashSet<PageKey>,
    next_version: AtomicU64,
    counters: Counters,
    ttl: Duration,
    idle_eviction: Duration,
    stale_fetch_timeout: Duration,
    max_entries: usize,
    metrics: Arc<MetricsCollector>,
}

/// In-memory serving cache of normalized transaction pages.
///
/// Reads of cached pages never wait: fresh pages are returned directly and stale
/// pages are returned while one background refresh runs. Only a key with no page at
/// all makes the caller wait, and concurrent callers for that key share one fetch.
///
/// Fetches run as spawned tasks, so a fetch completes and commits even if every
/// caller waiting on it goes away. Within one key, commits are ordered by the
/// version taken when the fetch started.
///
/// Cloning is cheap and every clone shares the same storage.
#[derive(Clone)]
pub struct TransactionCache {
    inner: Arc<Inner>,
}

impl TransactionCache {
    /// Creates an empty cache over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if `config` fails validation.
    pub fn new(
        config: &TransactionCacheConfig,
        source: Arc<dyn TransactionSource>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                entries: DashMap::new(),
                inflight: Arc::new(DashMap::new()),
                pinned: DashSet::new(),
                next_version: AtomicU64::new(0),
                counters: Counters::default(),
                ttl: config.ttl(),
                idle_eviction: config.idle_eviction(),
                stale_fetch_timeout: config.stale_fetch_timeout(),
                max_entries: config.max_entries,
                metrics,
            }),
        })
    }

    /// Returns the page for `key`.
    ///
    /// - fresh entry: returned immediately
    /// - stale entry: returned immediately, one background refresh is started
    /// - no entry: waits for the (shared) first fetch
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamUnavailable`] only when no page has ever been cached for `key`
    /// and the fetch fails.
    pub async fn get(&self, key: PageKey) -> Result<Arc<Page>, UpstreamUnavailable> {
        let now = Instant::now();

        if let Some(slot) = self.inner.slot(&key) {
            slot.touch(now);
            let snapshot = slot.load();

            if snapshot.is_fresh(self.inner.ttl, now) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.record_cache_lookup(LookupOutcome::Hit);
                return Ok(Arc::clone(&snapshot.page));
            }

            self.inner.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
            self.inner.metrics.record_cache_lookup(LookupOutcome::Stale);
            debug!(key = %key, "serving stale entry, refreshing in background");
            Inner::refresh_in_background(&self.inner, key);
            return Ok(Arc::clone(&snapshot.page));
        }

        match Inner::join_or_start(&self.inner, key) {
            Join::Cached(page) => {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.record_cache_lookup(LookupOutcome::Hit);
                Ok(page)
            }
            Join::Fetch { future, started } => {
                if started {
                    self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                    self.inner.metrics.record_cache_lookup(LookupOutcome::Miss);
                } else {
                    self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    self.inner.metrics.record_cache_lookup(LookupOutcome::Coalesced);
                }
                future.await
            }
        }
    }

    /// Fetches `keys` concurrently and pins them against idle eviction.
    ///
    /// Failures are reported, not raised: a key that fails here is fetched again on
    /// first use or by the next maintenance pass.
    pub async fn warm_up(&self, keys: &[PageKey]) -> WarmUpReport {
        let started = Instant::now();

        let fetches: Vec<_> = keys
            .iter()
            .map(|key| {
                self.inner.pinned.insert(*key);
                let key = *key;
                let future = match Inner::join_or_start(&self.inner, key) {
                    Join::Cached(page) => futures::future::ready(Ok(page)).boxed(),
                    Join::Fetch { future, .. } => future.boxed(),
                };
                future.map(move |result| (key, result))
            })
            .collect();

        let mut report = WarmUpReport::default();
        for (key, result) in futures::future::join_all(fetches).await {
            match result {
                Ok(page) => {
                    debug!(key = %key, transactions = page.transactions.len(), "warmed cache key");
                    report.succeeded.push(key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "cache warm-up failed for key");
                    report.failed.push((key, e));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "cache warm-up finished"
        );
        report
    }

    /// Pins `key` without fetching it.
    pub fn pin(&self, key: PageKey) {
        self.inner.pinned.insert(key);
    }

    #[must_use]
    pub fn is_pinned(&self, key: &PageKey) -> bool {
        self.inner.pinned.contains(key)
    }

    /// Current lifecycle state of `key`. Does not count as an access.
    #[must_use]
    pub fn state(&self, key: &PageKey) -> EntryState {
        if let Some(slot) = self.inner.slot(key) {
            return if slot.load().is_fresh(self.inner.ttl, Instant::now()) {
                EntryState::Fresh
            } else {
                EntryState::Stale
            };
        }
        if self.inner.inflight.contains_key(key) {
            EntryState::Warming
        } else {
            EntryState::Empty
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            entries: self.inner.entries.len(),
            pinned: self.inner.pinned.len(),
            inflight: self.inner.inflight.len(),
            hits: counters.hits.load(Ordering::Relaxed),
            stale_hits: counters.stale_hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            refresh_failures: counters.refresh_failures.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drops unpinned entries not read for the idle period. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let idle = self.inner.idle_eviction;
        let before = self.inner.entries.len();

        self.inner.entries.retain(|key, slot| {
            self.inner.pinned.contains(key) ||
                now.saturating_duration_since(slot.last_access()) < idle
        });

        let evicted = before.saturating_sub(self.inner.entries.len());
        if evicted > 0 {
            self.inner.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            self.inner.metrics.record_cache_eviction("idle", evicted);
            debug!(evicted, "evicted idle cache entries");
        }
        evicted
    }

    /// Starts background refreshes for pinned keys that are stale or missing.
    /// Returns how many keys needed one.
    pub fn refresh_pinned(&self) -> usize {
        let now = Instant::now();
        // Collected first so no pinned-set guard is held while reading entries.
        let pinned: Vec<PageKey> = self.inner.pinned.iter().map(|key| *key).collect();
        let due: Vec<PageKey> = pinned
            .into_iter()
            .filter(|key| {
                self.inner.slot(key).is_none_or(|slot| !slot.load().is_fresh(self.inner.ttl, now))
            })
            .collect();

        for key in &due {
            Inner::refresh_in_background(&self.inner, *key);
        }
        if !due.is_empty() {
            debug!(count = due.len(), "refreshing pinned cache entries");
        }
        due.len()
    }

    /// One maintenance pass: idle eviction, pinned refresh, size gauges.
    pub fn run_maintenance(&self) {
        self.evict_idle();
        self.refresh_pinned();
        self.inner.metrics.record_cache_size(self.inner.entries.len(), self.inner.inflight.len());
    }

    /// Spawns the periodic maintenance task. It stops when `shutdown_rx` fires.
    #[must_use]
    pub fn start_maintenance_task(
        &self,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(crate::cache::background::run_maintenance_loop(cache, interval, shutdown_rx))
    }

    #[cfg(test)]
    pub(crate) fn commit_for_test(&self, key: PageKey, page: Page, version: u64) -> bool {
        self.inner.commit(key, Arc::new(page), version)
    }
}

impl Inner {
    fn slot(&self, key: &PageKey) -> Option<Arc<CacheSlot>> {
        self.entries.get(key).map(|slot| Arc::clone(slot.value()))
    }

    fn refresh_in_background(this: &Arc<Self>, key: PageKey) {
        // Joining an existing fetch is enough; the spawned task commits on its own.
        let _ = Self::join_or_start(this, key);
    }

    /// Joins the live fetch for `key` or starts one.
    fn join_or_start(this: &Arc<Self>, key: PageKey) -> Join {
        let now = Instant::now();

        match this.inflight.entry(key) {
            Entry::Occupied(mut occupied) => {
                if now.saturating_duration_since(occupied.get().started_at) <
                    this.stale_fetch_timeout
                {
                    return Join::Fetch { future: occupied.get().future.clone(), started: false };
                }

                warn!(
                    key = %key,
                    version = occupied.get().version,
                    "superseding abandoned in-flight fetch"
                );
                let fetch = Self::spawn_fetch(this, key, now);
                let future = fetch.future.clone();
                occupied.insert(fetch);
                Join::Fetch { future, started: true }
            }
            Entry::Vacant(vacant) => {
                // A fetch may have committed and deregistered since the caller's lookup.
                if let Some(slot) = this.slot(&key) {
                    let snapshot = slot.load();
                    if snapshot.is_fresh(this.ttl, now) {
                        return Join::Cached(Arc::clone(&snapshot.page));
                    }
                }

                let fetch = Self::spawn_fetch(this, key, now);
                let future = fetch.future.clone();
                vacant.insert(fetch);
                Join::Fetch { future, started: true }
            }
        }
    }

    fn spawn_fetch(this: &Arc<Self>, key: PageKey, now: Instant) -> InflightFetch {
        let version = this.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(this);

        debug!(key = %key, version, "starting upstream fetch");
        let handle = tokio::spawn(async move {
            let _guard = FetchGuard::new(Arc::clone(&inner.inflight), key, version);
            inner.run_fetch(key, version).await
        });

        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(UpstreamUnavailable {
                    attempts: 0,
                    last_status: None,
                    last_latency: Duration::ZERO,
                    reason: format!("fetch task failed: {e}"),
                }),
            }
        }
        .boxed()
        .shared();

        InflightFetch { future, started_at: now, version }
    }

    async fn run_fetch(&self, key: PageKey, version: u64) -> FetchResult {
        match self.source.fetch_page(&key).await {
            Ok(page) => {
                let page = Arc::new(page);
                self.commit(key, Arc::clone(&page), version);
                self.metrics.record_cache_refresh(true);
                Ok(page)
            }
            Err(e) => {
                self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_cache_refresh(false);
                if self.entries.contains_key(&key) {
                    warn!(key = %key, error = %e, "cache refresh failed, keeping stale entry");
                } else {
                    warn!(key = %key, error = %e, "initial fetch failed, no entry to serve");
                }
                Err(e)
            }
        }
    }

    /// Stores `page` under `key` unless a newer version is already committed.
    fn commit(&self, key: PageKey, page: Arc<Page>, version: u64) -> bool {
        let now = Instant::now();
        let snapshot = Snapshot { page, fetched_at: now, version };

        let (committed, inserted) = match self.entries.entry(key) {
            Entry::Occupied(occupied) => (occupied.get().publish(snapshot), false),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(CacheSlot::new(snapshot, now)));
                (true, true)
            }
        };

        if !committed {
            debug!(key = %key, version, "discarding fetch result older than committed entry");
        }
        if inserted && self.entries.len() > self.max_entries {
            self.evict_over_capacity(key);
        }
        committed
    }

    /// Removes least recently used unpinned entries until within capacity.
    fn evict_over_capacity(&self, keep: PageKey) {
        while self.entries.len() > self.max_entries {
            let victim = self
                .entries
                .iter()
                .filter(|slot| *slot.key() != keep && !self.pinned.contains(slot.key()))
                .min_by_key(|slot| slot.value().last_access())
                .map(|slot| *slot.key());

            let Some(victim) = victim else {
                break;
            };
            if self.entries.remove(&victim).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_cache_eviction("capacity", 1);
                debug!(key = %victim, "evicted least recently used cache entry");
            }
        }
    }
}
