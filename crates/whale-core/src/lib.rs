//! # Whale Core
//!
//! Core library for the whale transaction feed: a paginated, threshold-filtered view
//! of large on-chain transfers served from a warm in-memory cache.
//!
//! This crate provides:
//!
//! - **[`upstream`]**: provider client with per-attempt timeouts, bounded retries and
//!   lenient payload normalization.
//!
//! - **[`cache`]**: transaction page cache with request coalescing,
//!   stale-while-revalidate refresh, versioned commits, warm-up and idle eviction.
//!
//! - **[`middleware`]**: per-client sliding-log rate limiting.
//!
//! - **[`query`]**: parameter normalization and graceful degradation for client
//!   requests.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! - **[`config`]** and **[`runtime`]**: layered configuration and component
//!   lifecycle.
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │ RateLimiter │ ─── Rejected ──► 429 + Retry-After
//! └──────┬──────┘
//!        │ Admitted
//!        ▼
//! ┌──────────────┐
//! │ QueryService │  default / clamp page and threshold
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ TransactionCache │ ─── Fresh ──► Cached Page
//! │                  │ ─── Stale ──► Cached Page + background refresh
//! └────────┬─────────┘
//!          │ Empty (one shared fetch per key)
//!          ▼
//! ┌──────────────────┐
//! │  UpstreamClient  │ ─── Exhausted ──► empty page, totalPages = 1
//! │ (retry+backoff)  │
//! └────────┬─────────┘
//!          │
//!          ▼
//!   normalize, commit, respond
//! ```

pub mod cache;
pub mod config;
pub mod metrics;
pub mod middleware;
pub mod query;
pub mod runtime;
pub mod types;
pub mod upstream;
