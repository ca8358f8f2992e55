//! HTTP middleware components for the feed server.
//!
//! These are Axum adapters around the business logic in `whale_core::middleware`.
//! They handle HTTP concerns (client identity, status codes, headers) and delegate
//! admission decisions to the core library.

pub mod correlation_id;
pub mod rate_limiting;

pub use correlation_id::{
    create_request_id_layers, make_request_span, request_id, UuidRequestIdGenerator,
    X_REQUEST_ID,
};
pub use rate_limiting::{
    client_identity, rate_limit_middleware, RateLimitState, RateLimitedResponse,
};
