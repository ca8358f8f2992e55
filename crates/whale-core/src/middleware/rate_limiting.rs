use crate::metrics::MetricsCollector;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info};

/// Admission settings for the public API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per identity within one window. Defaults to `60`.
    #[serde(default = "default_ceiling")]
    pub ceiling: u32,

    /// Window width in seconds. Defaults to `60`.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Maximum number of identities tracked at once. Defaults to `100000`.
    #[serde(default = "default_max_identities")]
    pub max_identities: usize,

    /// Identify clients by the first `X-Forwarded-For` address instead of the peer
    /// address. Only enable behind a trusted proxy. Defaults to `false`.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_ceiling() -> u32 {
    60
}

fn default_window_seconds() -> u64 {
    60
}

fn default_max_identities() -> usize {
    100_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
            window_seconds: default_window_seconds(),
            max_identities: default_max_identities(),
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Outcome of [`RateLimiter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted against the window; `remaining` admissions are left in it.
    Admitted { remaining: u32 },
    /// Not counted; the next admission becomes possible after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// # Errors
    ///
    /// Returns [`RateLimited`] for a rejected admission.
    pub fn into_result(self) -> Result<u32, RateLimited> {
        match self {
            Self::Admitted { remaining } => Ok(remaining),
            Self::Rejected { retry_after } => Err(RateLimited { retry_after }),
        }
    }
}

/// A request was denied admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit exceeded, retry after {}s", self.retry_after_secs())]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// `retry_after` rounded up to whole seconds, at least 1.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let rounded = if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs };
        rounded.max(1)
    }
}

/// Per-identity sliding-log rate limiter.
///
/// Each identity keeps the instants of its admissions inside the current window.
/// An admission is granted only while fewer than `ceiling` instants are younger than
/// the window, so no window of `window` width ever holds more than `ceiling`
/// admissions. Rejections are not logged.
///
/// Admissions for one identity are linearized by its `DashMap` shard lock.
///
/// **Security**: Limits maximum tracked identities to prevent OOM from spoofed
/// addresses.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, VecDeque<Instant>>>,
    ceiling: u32,
    window: Duration,
    max_identities: usize,
}

impl RateLimiter {
    pub const DEFAULT_MAX_IDENTITIES: usize = 100_000;

    #[must_use]
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self::with_max_identities(ceiling, window, Self::DEFAULT_MAX_IDENTITIES)
    }

    #[must_use]
    pub fn with_max_identities(ceiling: u32, window: Duration, max_identities: usize) -> Self {
        Self { windows: Arc::new(DashMap::new()), ceiling, window, max_identities }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_max_identities(config.ceiling, config.window(), config.max_identities)
    }

    /// Admits or rejects one request from `identity`.
    ///
    /// A new identity arriving while `max_identities` are tracked is rejected for a
    /// full window.
    #[must_use]
    pub fn admit(&self, identity: &str) -> Admission {
        let now = Instant::now();

        if let Some(mut log) = self.windows.get_mut(identity) {
            return self.admit_into(&mut log, now);
        }

        if self.windows.len() >= self.max_identities {
            debug!(tracked = self.windows.len(), "rate limiter at identity capacity");
            return Admission::Rejected { retry_after: self.window };
        }

        let mut log = self.windows.entry(identity.to_string()).or_default();
        self.admit_into(&mut log, now)
    }

    fn admit_into(&self, log: &mut VecDeque<Instant>, now: Instant) -> Admission {
        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        let admitted = u32::try_from(log.len()).unwrap_or(u32::MAX);
        if admitted < self.ceiling {
            log.push_back(now);
            return Admission::Admitted { remaining: self.ceiling - admitted - 1 };
        }

        let retry_after = log
            .front()
            .map_or(self.window, |oldest| {
                self.window.saturating_sub(now.saturating_duration_since(*oldest))
            });
        Admission::Rejected { retry_after }
    }

    /// Drops identities with no admission inside the window. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();

        self.windows.retain(|_, log| {
            log.back().is_some_and(|latest| now.saturating_duration_since(*latest) < self.window)
        });

        before.saturating_sub(self.windows.len())
    }

    /// Spawns the periodic cleanup task. Each pass also samples the tracked identity
    /// gauge. It stops when `shutdown_rx` fires.
    #[must_use]
    pub fn start_cleanup_task(
        &self,
        metrics: Arc<MetricsCollector>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let limiter = self.clone();
        let cleanup_interval = self.window.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + cleanup_interval, cleanup_interval);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => break,

                    _ = interval.tick() => {
                        let removed = limiter.cleanup_expired();
                        let remaining = limiter.identity_count();
                        metrics.record_rate_limit_identities(remaining);
                        if removed > 0 {
                            debug!(removed, remaining, "rate limiter cleanup");
                        }
                    }
                }
            }

            info!("rate limiter cleanup task shutdown complete");
        })
    }

    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}
