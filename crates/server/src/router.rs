use crate::middleware::{self, RateLimitState};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::{any::Any, sync::Arc};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;
use whale_core::{metrics::MetricsCollector, query::QueryService, types::TransactionsResponse};

/// Path of the transaction feed endpoint.
pub const TRANSACTIONS_PATH: &str = "/api/whale-transactions";

/// Body of `GET /`.
pub const LIVENESS_MESSAGE: &str = "Whale transaction feed is running";

/// Shared state for the public routes.
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    #[must_use]
    pub fn new(query_service: Arc<QueryService>, metrics: Arc<MetricsCollector>) -> Self {
        Self { query_service, metrics }
    }
}

/// Builds the application router.
///
/// Only the feed endpoint sits behind the rate limiter. Request IDs, tracing and
/// panic recovery wrap every route.
pub fn create_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let (set_request_id, propagate_request_id) = middleware::create_request_id_layers();

    let api = Router::new()
        .route(TRANSACTIONS_PATH, get(handle_transactions))
        .route_layer(axum_middleware::from_fn_with_state(
            rate_limit,
            middleware::rate_limit_middleware,
        ));

    Router::new()
        .route("/", get(handle_root))
        .route("/metrics", get(handle_metrics))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(middleware::make_request_span))
        .layer(CatchPanicLayer::custom(handle_panic))
        // Layers are applied in reverse order, so propagate runs after set
        .layer(propagate_request_id)
        .layer(set_request_id)
}

/// Liveness check.
pub async fn handle_root() -> &'static str {
    LIVENESS_MESSAGE
}

/// Serves one page of the feed.
///
/// Query parameters are taken as raw text so malformed values reach the query
/// service's defaulting instead of failing extraction. When a parameter repeats, the
/// first occurrence wins.
pub async fn handle_transactions(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<TransactionsResponse> {
    let first = |name: &str| params.iter().find(|(key, _)| key == name).map(|(_, v)| v.as_str());

    Json(state.query_service.query(first("page"), first("threshold")).await)
}

pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.get_prometheus_metrics(),
    )
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Renders a caught handler panic as `500 { error, message }`.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "request handler panicked");

    let body = ErrorBody {
        error: "internal_error",
        message: "An unexpected error occurred.".to_string(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
