//! HTTP surface of the whale transaction feed.

pub mod middleware;
pub mod router;
