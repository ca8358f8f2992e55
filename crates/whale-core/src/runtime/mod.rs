//! Whale feed runtime initialization and lifecycle management.
//!
//! The runtime owns every long-lived component: the metrics collector, the upstream
//! client, the transaction cache, the rate limiter and the query service. It starts
//! their background tasks on build and stops them through one shutdown broadcast.
//!
//! # Example
//!
//! ```no_run
//! use whale_core::{config::AppConfig, runtime::WhaleRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let runtime = WhaleRuntime::builder().with_config(config).build()?;
//!
//!     // Populate the hot keys before accepting traffic.
//!     runtime.warm_up().await;
//!
//!     let response = runtime.query_service().query(Some("1"), Some("100")).await;
//!     println!("{} transactions", response.transactions.len());
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{RuntimeError, WhaleRuntimeBuilder};
pub use components::WhaleComponents;
pub use lifecycle::WhaleRuntime;
