//! End-to-end tests for the public HTTP surface.
//!
//! Each test builds the real router over a real runtime whose upstream is a mockito
//! server, then drives it with `tower::ServiceExt::oneshot`. Every response is
//! checked for the wire shape dashboard clients depend on.

use crate::mock_infrastructure::{
    create_provider_page, create_provider_record, create_provider_records, UpstreamMockBuilder,
};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use serial_test::serial;
use server::{
    middleware::RateLimitState,
    router::{create_app, AppState},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;
use whale_core::{config::AppConfig, runtime::WhaleRuntime};

fn create_test_app(config: AppConfig) -> (Router, WhaleRuntime) {
    let runtime = WhaleRuntime::builder()
        .with_config(config)
        .disable_cache_maintenance()
        .disable_rate_limit_cleanup()
        .build()
        .expect("Failed to build runtime");

    let state =
        AppState::new(runtime.query_service().clone(), runtime.metrics_collector().clone());
    let rate_limit = RateLimitState::new(
        runtime.rate_limiter().clone(),
        runtime.metrics_collector().clone(),
        runtime.config().rate_limit.trust_forwarded_for,
    );
    (create_app(state, rate_limit), runtime)
}

fn create_test_config(mock: &UpstreamMockBuilder) -> AppConfig {
    let mut config = AppConfig { upstream: mock.upstream_config(), ..Default::default() };
    config.cache.warm_up_keys.clear();
    config
}

fn get_from(uri: &str, client: Ipv4Addr) -> Request<Body> {
    let peer = SocketAddr::new(IpAddr::V4(client), 51000);
    Request::builder().uri(uri).extension(ConnectInfo(peer)).body(Body::empty()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    get_from(uri, Ipv4Addr::new(198, 51, 100, 10))
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
#[serial]
async fn test_feed_returns_normalized_transactions() {
    let mut mock = UpstreamMockBuilder::new().await;
    let body = create_provider_page(
        vec![
            create_provider_record("0xaaa", 12_500_000.5, "ethereum"),
            create_provider_record("0xbbb", 2_000_000.0, "tron"),
        ],
        12,
    );
    mock.mock_page(3, "1000000", &body, 1).await;
    let (app, runtime) = create_test_app(create_test_config(&mock));

    let response = app
        .oneshot(get("/api/whale-transactions?page=3&threshold=1000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        body_json(response).await,
        json!({
            "transactions": [
                {
                    "hash": "0xaaa",
                    "timestamp": 1_700_000_000,
                    "from": "1BinanceColdWallet",
                    "to": "bc1qunknownrecipient",
                    "value": 12_500_000.5,
                    "chain": "ethereum"
                },
                {
                    "hash": "0xbbb",
                    "timestamp": 1_700_000_000,
                    "from": "1BinanceColdWallet",
                    "to": "bc1qunknownrecipient",
                    "value": 2_000_000.0,
                    "chain": "tron"
                }
            ],
            "totalPages": 12
        })
    );

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_repeated_requests_served_from_cache() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_page(1, "100", &create_provider_page(create_provider_records(2, 500.0), 1), 1)
        .await;
    let (app, runtime) = create_test_app(create_test_config(&mock));

    for uri in [
        "/api/whale-transactions",
        "/api/whale-transactions?page=1",
        "/api/whale-transactions?threshold=100",
        "/api/whale-transactions?page=1&threshold=100.0",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "uri {uri}");
        assert_eq!(body_json(response).await["transactions"].as_array().unwrap().len(), 2);
    }

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_malformed_parameters_fall_back_to_defaults() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_page(1, "100", &create_provider_page(create_provider_records(1, 700.0), 1), 1)
        .await;
    mock.mock_page(1, "0", &create_provider_page(create_provider_records(1, 5.0), 1), 1).await;
    let (app, runtime) = create_test_app(create_test_config(&mock));

    for uri in [
        "/api/whale-transactions?page=zero&threshold=much",
        "/api/whale-transactions?page=-4",
        "/api/whale-transactions?page=0&threshold=NaN",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "uri {uri}");
    }

    // A negative threshold clamps to zero rather than defaulting.
    let response =
        app.oneshot(get("/api/whale-transactions?threshold=-50")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_provider_outage_degrades_to_empty_page() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(500, 3).await;
    let (app, runtime) = create_test_app(create_test_config(&mock));

    let response = app.oneshot(get("/api/whale-transactions?page=2")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "transactions": [], "totalPages": 1 }));

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_rate_limit_rejects_before_provider() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_any_page(&create_provider_page(create_provider_records(1, 900.0), 1)).await;

    let mut config = create_test_config(&mock);
    config.rate_limit.ceiling = 3;
    let (app, runtime) = create_test_app(config);

    let noisy = Ipv4Addr::new(203, 0, 113, 77);
    for _ in 0..3 {
        let response =
            app.clone().oneshot(get_from("/api/whale-transactions", noisy)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response =
        app.clone().oneshot(get_from("/api/whale-transactions", noisy)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 =
        response.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(body_json(response).await["retryAfterSeconds"], retry_after);

    // Another client is unaffected, and so are the unthrottled routes.
    let quiet = Ipv4Addr::new(203, 0, 113, 78);
    let response = app.clone().oneshot(get_from("/api/whale-transactions", quiet)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.oneshot(get_from("/", noisy)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_metrics_reflect_served_requests() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_any_page(&create_provider_page(create_provider_records(1, 900.0), 1)).await;
    let (app, runtime) = create_test_app(create_test_config(&mock));

    app.clone().oneshot(get("/api/whale-transactions")).await.unwrap();
    app.clone().oneshot(get("/api/whale-transactions")).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("whale_cache_lookups_total"));
    assert!(text.contains("whale_rate_limit"));

    runtime.shutdown().await;
}
