//! Mock Infrastructure for Testing the Whale Feed
//!
//! This module provides reusable mock types for testing provider interactions
//! without requiring real network connections.
//!
//! ## Components
//!
//! - `UpstreamMockBuilder`: Wraps mockito to serve provider listing responses
//! - Test helpers for building provider payloads
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{create_provider_page, create_provider_records, UpstreamMockBuilder};
//!
//! let mut mock = UpstreamMockBuilder::new().await;
//! mock.mock_page(1, "100", &create_provider_page(create_provider_records(3, 500.0), 1), 1).await;
//!
//! let client = UpstreamClient::new(mock.upstream_config(), metrics)?;
//! ```

pub mod upstream_mock;

pub use test_helpers::*;
pub use upstream_mock::{UpstreamMockBuilder, TRANSACTIONS_PATH};
