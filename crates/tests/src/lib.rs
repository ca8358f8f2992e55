//! Integration and End-to-End Tests for the Whale Transaction Feed
//!
//! This crate contains various test modules:
//!
//! - `upstream_client_tests`: Retry budget, error classification and record dropping
//!   against a mocked provider
//! - `runtime_tests`: Runtime build validation, warm-up, coalescing and shutdown
//! - `feed_endpoint_tests`: The public HTTP surface over a real runtime
//! - `mock_infrastructure`: Reusable mockito provider and payload builders
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Tests share the process-wide metrics recorder and bind local mock servers, so the
//! ones touching either run under `#[serial]`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

#[cfg(test)]
mod upstream_client_tests;

#[cfg(test)]
mod runtime_tests;

#[cfg(test)]
mod feed_endpoint_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
