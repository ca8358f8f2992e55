//! Request ID middleware.
//!
//! Every request gets an `x-request-id`: the client's own when supplied, otherwise a
//! generated UUID v4. The ID is echoed on the response and recorded on the request's
//! tracing span so log lines from one request can be grouped.

use axum::http::{header::HeaderValue, HeaderName, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Span;
use uuid::Uuid;

/// The header name for request IDs.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// A UUID v4 generator for request IDs.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestIdGenerator;

impl MakeRequestId for UuidRequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).ok()?))
    }
}

/// Returns the set and propagate layers. Apply `propagate` before `set` so that `set`
/// wraps it and runs first:
///
/// ```ignore
/// let (set_request_id, propagate_request_id) = create_request_id_layers();
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(propagate_request_id)
///     .layer(set_request_id);
/// ```
#[must_use]
pub fn create_request_id_layers(
) -> (SetRequestIdLayer<UuidRequestIdGenerator>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestIdGenerator),
        PropagateRequestIdLayer::new(X_REQUEST_ID.clone()),
    )
}

/// Request ID of `request`, if the set layer already ran.
#[must_use]
pub fn request_id<B>(request: &Request<B>) -> Option<&str> {
    request.headers().get(&X_REQUEST_ID).and_then(|value| value.to_str().ok())
}

/// Span factory for `TraceLayer` carrying method, path and request ID.
pub fn make_request_span<B>(request: &Request<B>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = request_id(request).unwrap_or("-"),
    )
}
