//! Configuration and error types for the transaction cache.

use crate::types::{PageKey, PageKeyParseError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that occur while constructing a [`crate::cache::TransactionCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid configuration parameter (typically a zero duration or capacity).
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// A configured warm-up key is not of the form `page:threshold`.
    #[error("Invalid warm-up key `{key}`: {source}")]
    InvalidWarmUpKey {
        key: String,
        #[source]
        source: PageKeyParseError,
    },
}

/// Freshness, eviction and warm-up settings for the transaction cache.
///
/// # Lifecycle
///
/// - An entry is **fresh** for `ttl_seconds` after it was fetched, then **stale**.
///   Stale entries are served while one background refresh runs.
/// - Entries not read for `idle_eviction_seconds` are dropped by the maintenance task,
///   unless they were warmed up (pinned).
/// - Pinned entries are refreshed by the maintenance task once they go stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCacheConfig {
    /// Freshness window in seconds (default: 60)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Idle period after which unpinned entries are evicted, in seconds (default: 1800)
    #[serde(default = "default_idle_eviction_seconds")]
    pub idle_eviction_seconds: u64,
    /// Interval between maintenance passes in seconds (default: 60)
    #[serde(default = "default_maintenance_interval_seconds")]
    pub maintenance_interval_seconds: u64,
    /// Maximum number of cached pages (default: 10,000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// An in-flight fetch older than this is considered abandoned and may be
    /// superseded by a new one, in seconds (default: 120)
    #[serde(default = "default_stale_fetch_seconds")]
    pub stale_fetch_seconds: u64,
    /// Keys fetched and pinned before the server accepts traffic, as `page:threshold`
    #[serde(default = "default_warm_up_keys")]
    pub warm_up_keys: Vec<String>,
    /// Upper bound on how long startup waits for warm-up, in seconds (default: 30)
    #[serde(default = "default_warm_up_timeout_seconds")]
    pub warm_up_timeout_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    60
}

fn default_idle_eviction_seconds() -> u64 {
    30 * 60
}

fn default_maintenance_interval_seconds() -> u64 {
    60
}

fn default_max_entries() -> usize {
    10_000
}

fn default_stale_fetch_seconds() -> u64 {
    120
}

fn default_warm_up_keys() -> Vec<String> {
    vec!["1:100".to_string()]
}

fn default_warm_up_timeout_seconds() -> u64 {
    30
}

impl Default for TransactionCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            idle_eviction_seconds: default_idle_eviction_seconds(),
            maintenance_interval_seconds: default_maintenance_interval_seconds(),
            max_entries: default_max_entries(),
            stale_fetch_seconds: default_stale_fetch_seconds(),
            warm_up_keys: default_warm_up_keys(),
            warm_up_timeout_seconds: default_warm_up_timeout_seconds(),
        }
    }
}

impl TransactionCacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn idle_eviction(&self) -> Duration {
        Duration::from_secs(self.idle_eviction_seconds)
    }

    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_seconds)
    }

    #[must_use]
    pub fn stale_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_fetch_seconds)
    }

    #[must_use]
    pub fn warm_up_timeout(&self) -> Duration {
        Duration::from_secs(self.warm_up_timeout_seconds)
    }

    /// Parses `warm_up_keys`, dropping duplicates while keeping configured order.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidWarmUpKey`] for the first key that does not parse.
    pub fn parsed_warm_up_keys(&self) -> Result<Vec<PageKey>, CacheError> {
        let mut keys: Vec<PageKey> = Vec::with_capacity(self.warm_up_keys.len());
        for raw in &self.warm_up_keys {
            let key = raw.parse::<PageKey>().map_err(|source| CacheError::InvalidWarmUpKey {
                key: raw.clone(),
                source,
            })?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// # Errors
    ///
    /// Returns [`CacheError`] if a duration or the capacity is zero, or a warm-up key
    /// is malformed.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl_seconds == 0 {
            return Err(CacheError::InvalidConfig("ttl_seconds must be non-zero".to_string()));
        }
        if self.idle_eviction_seconds == 0 {
            return Err(CacheError::InvalidConfig(
                "idle_eviction_seconds must be non-zero".to_string(),
            ));
        }
        if self.maintenance_interval_seconds == 0 {
            return Err(CacheError::InvalidConfig(
                "maintenance_interval_seconds must be non-zero".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig("max_entries must be non-zero".to_string()));
        }
        if self.stale_fetch_seconds == 0 {
            return Err(CacheError::InvalidConfig(
                "stale_fetch_seconds must be non-zero".to_string(),
            ));
        }
        self.parsed_warm_up_keys().map(|_| ())
    }
}
