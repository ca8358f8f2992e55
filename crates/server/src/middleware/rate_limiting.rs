use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use whale_core::{
    metrics::MetricsCollector,
    middleware::{Admission, RateLimited, RateLimiter},
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when neither a peer address nor a trusted forwarded address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// State shared by every invocation of [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    trust_forwarded_for: bool,
}

impl RateLimitState {
    #[must_use]
    pub fn new(
        limiter: Arc<RateLimiter>,
        metrics: Arc<MetricsCollector>,
        trust_forwarded_for: bool,
    ) -> Self {
        Self { limiter, metrics, trust_forwarded_for }
    }
}

/// JSON body of a `429 Too Many Requests` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: &'static str,
    message: &'static str,
    retry_after_seconds: u64,
}

/// Renders a rejected admission as `429` with a `Retry-After` header.
pub struct RateLimitedResponse(pub RateLimited);

impl IntoResponse for RateLimitedResponse {
    fn into_response(self) -> Response {
        let retry_after = self.0.retry_after_secs();
        let body = RateLimitedBody {
            error: "rate_limited",
            message: "Too many requests, please try again later.",
            retry_after_seconds: retry_after,
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

/// Derives the rate-limit identity for a request.
///
/// The peer IP by default. With `trust_forwarded_for` set, the first address of
/// `X-Forwarded-For` wins when present and non-empty.
#[must_use]
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());

        if let Some(first) = forwarded {
            return first.to_string();
        }
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

/// Rate limiting middleware that enforces per-client request limits.
///
/// Rejected requests never reach the handler, so they cost neither a cache lookup
/// nor an upstream call.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    let identity = client_identity(request.headers(), peer, state.trust_forwarded_for);

    let admission = state.limiter.admit(&identity);
    state.metrics.record_rate_limit(admission.is_admitted());

    match admission {
        Admission::Admitted { .. } => next.run(request).await,
        Admission::Rejected { retry_after } => {
            tracing::debug!(
                client = %identity,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "rate limit exceeded"
            );
            RateLimitedResponse(RateLimited { retry_after }).into_response()
        }
    }
}
