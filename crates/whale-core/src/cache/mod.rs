//! Serving cache for transaction pages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      TransactionCache                         │
//! │                                                              │
//! │  entries: DashMap<PageKey, CacheSlot>   inflight: DashMap<    │
//! │    • ArcSwap<Snapshot> (page, version)    PageKey,            │
//! │    • last access                          InflightFetch>      │
//! │                                           • Shared future     │
//! │  pinned: DashSet<PageKey> (warm-up keys)  • version           │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │ commit (versioned)            │ spawn
//!                │                      ┌────────▼────────┐
//!                └──────────────────────│ fetch task      │──► TransactionSource
//!                                       │ (FetchGuard)    │
//!                                       └─────────────────┘
//! ```
//!
//! # Read Path
//!
//! | State | `get` behavior |
//! |-------|----------------|
//! | Fresh | return page |
//! | Stale | return page, start one background refresh |
//! | Warming | await the in-flight fetch |
//! | Empty | start a fetch and await it |
//!
//! A failed refresh leaves the stale page in place. A failed first fetch is returned to
//! every caller waiting on it.
//!
//! # Consistency Patterns
//!
//! - No `DashMap` guard is held across an `.await`; slots are cloned out as `Arc`s.
//! - Lock order is `inflight` → `entries` → `pinned`; no path acquires them in reverse.
//! - Commits for one key are serialized by its `entries` shard lock and ordered by version.

pub mod config;
pub mod entry;
pub mod transaction_cache;

mod background;
mod inflight;

#[cfg(test)]
mod tests;

pub use config::{CacheError, TransactionCacheConfig};
pub use entry::EntryState;
pub use transaction_cache::{CacheStats, TransactionCache, WarmUpReport};
