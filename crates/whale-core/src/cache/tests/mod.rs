//! Behavior tests for `TransactionCache`.
//!
//! All tests run on a paused clock and a scripted source, so TTL and fetch latency are
//! exact. Pages produced by the source carry the call number in `total_pages`, which
//! is how tests tell one fetch result from another.

use crate::{
    cache::{EntryState, TransactionCache, TransactionCacheConfig},
    metrics::MetricsCollector,
    types::{Page, PageKey, WhaleTransaction},
    upstream::{TransactionSource, UpstreamUnavailable},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};
use tokio::{sync::oneshot, time::Duration};

// ============================================================================
// Shared Test Helpers
// ============================================================================

/// Source whose latency, failures and completion order are controlled by the test.
pub(crate) struct ScriptedSource {
    calls: AtomicU32,
    delay: Duration,
    failing: AtomicBool,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl ScriptedSource {
    pub(crate) fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            delay,
            failing: AtomicBool::new(false),
            gates: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn failing(delay: Duration) -> Arc<Self> {
        let source = Self::new(delay);
        source.set_failing(true);
        source
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The next call to start blocks until the returned sender fires.
    pub(crate) fn gate_next_call(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        tx
    }
}

#[async_trait]
impl TransactionSource for ScriptedSource {
    async fn fetch_page(&self, key: &PageKey) -> Result<Page, UpstreamUnavailable> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.gates.lock().pop_front();

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        tokio::time::sleep(self.delay).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamUnavailable {
                attempts: 3,
                last_status: Some(503),
                last_latency: self.delay,
                reason: "scripted outage".to_string(),
            });
        }

        Ok(Page::new(*key, vec![transaction(call, key.threshold() + Decimal::ONE)], call))
    }
}

pub(crate) fn transaction(call: u32, value: Decimal) -> WhaleTransaction {
    WhaleTransaction {
        hash: format!("0x{call:04x}"),
        timestamp: 1_700_000_000 + i64::from(call),
        from: "0xfrom".to_string(),
        to: "0xto".to_string(),
        value,
        chain: "ethereum".to_string(),
    }
}

pub(crate) fn test_config() -> TransactionCacheConfig {
    TransactionCacheConfig {
        ttl_seconds: 60,
        idle_eviction_seconds: 600,
        maintenance_interval_seconds: 60,
        max_entries: 100,
        stale_fetch_seconds: 120,
        warm_up_keys: Vec::new(),
        warm_up_timeout_seconds: 30,
    }
}

pub(crate) fn create_cache(
    config: &TransactionCacheConfig,
    source: &Arc<ScriptedSource>,
) -> TransactionCache {
    let source: Arc<dyn TransactionSource> = source.clone();
    TransactionCache::new(config, source, Arc::new(MetricsCollector::new()))
        .expect("valid test cache config")
}

pub(crate) fn key(page: u32) -> PageKey {
    PageKey::new(page, dec!(100))
}

/// Lets spawned fetch tasks run to completion on the paused clock.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

// ============================================================================
// Test Submodules
// ============================================================================
