//! Integration tests for `UpstreamClient` against a mocked provider.
//!
//! These tests pin the resilience contract of a single page fetch:
//! - Transient failures (5xx, transport) are retried up to the attempt budget
//! - Client errors (4xx, throttling included) fail on the first attempt
//! - Malformed records are dropped individually, malformed payloads fail the fetch

use crate::mock_infrastructure::{
    create_provider_page, create_provider_record, create_provider_records, UpstreamMockBuilder,
};
use rust_decimal_macros::dec;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use whale_core::{
    metrics::MetricsCollector,
    types::PageKey,
    upstream::{RetryPolicy, UpstreamClient, UpstreamConfig},
};

fn create_client(config: UpstreamConfig) -> UpstreamClient {
    UpstreamClient::new(config, Arc::new(MetricsCollector::new()))
        .expect("Failed to create upstream client")
}

#[tokio::test]
#[serial]
async fn test_fetches_and_normalizes_page() {
    let mut mock = UpstreamMockBuilder::new().await;
    let body = create_provider_page(create_provider_records(3, 250_000.0), 4);
    mock.mock_page(2, "100000", &body, 1).await;

    let client = create_client(mock.upstream_config());
    let page = client.fetch_page(&PageKey::new(2, dec!(100000))).await.expect("page");

    assert_eq!(page.total_pages, 4);
    assert_eq!(page.transactions.len(), 3);
    assert_eq!(page.transactions[0].value, dec!(250000));
    assert_eq!(page.transactions[0].chain, "bitcoin");
    assert_eq!(page.transactions[0].from, "1BinanceColdWallet");
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_server_errors_retried_until_budget_spent() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(503, 3).await;

    let client = create_client(mock.upstream_config());
    let err = client.fetch_page(&PageKey::new(1, dec!(100))).await.unwrap_err();

    assert_eq!(err.attempts, 3);
    assert_eq!(err.last_status, Some(503));
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_throttling_is_not_retried() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(429, 1).await;

    let client = create_client(mock.upstream_config());
    let err = client.fetch_page(&PageKey::new(1, dec!(100))).await.unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(err.last_status, Some(429));
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_client_errors_not_retried() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(401, 1).await;

    let client = create_client(mock.upstream_config());
    let err = client.fetch_page(&PageKey::new(1, dec!(100))).await.unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(err.last_status, Some(401));
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_recovers_after_transient_failure() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(502, 1).await;
    mock.mock_page(1, "100", &create_provider_page(create_provider_records(1, 5_000.0), 1), 1)
        .await;

    let client = create_client(mock.upstream_config());
    let page = client.fetch_page(&PageKey::new(1, dec!(100))).await.expect("page after retry");

    assert_eq!(page.transactions.len(), 1);
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_single_attempt_budget() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(500, 1).await;

    let mut config = mock.upstream_config();
    config.retry.max_attempts = 1;
    let client = create_client(config);

    let err = client.fetch_page(&PageKey::new(1, dec!(100))).await.unwrap_err();
    assert_eq!(err.attempts, 1);
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_malformed_records_dropped_individually() {
    let mut mock = UpstreamMockBuilder::new().await;
    let body = create_provider_page(
        vec![
            create_provider_record("0xgood", 1_500_000.0, "ethereum"),
            json!({ "timestamp": 1_700_000_000, "amount_usd": 2_000_000 }),
            json!({ "hash": "0xnotime", "amount_usd": 2_000_000 }),
            json!({ "hash": "0xnovalue", "timestamp": 1_700_000_000 }),
            json!({ "hash": "0xsmall", "timestamp": 1_700_000_000, "amount_usd": 10 }),
            json!("not an object"),
            json!({ "hash": "0xstrings", "timestamp": "1700000001", "amount_usd": "3000000.25" }),
        ],
        2,
    );
    mock.mock_page(1, "1000", &body, 1).await;

    let client = create_client(mock.upstream_config());
    let page = client.fetch_page(&PageKey::new(1, dec!(1000))).await.expect("page");

    let hashes: Vec<_> = page.transactions.iter().map(|tx| tx.hash.as_str()).collect();
    assert_eq!(hashes, vec!["0xgood", "0xstrings"]);
    assert_eq!(page.transactions[1].value, dec!(3000000.25));
    assert_eq!(page.transactions[1].chain, "unknown");
    assert_eq!(page.transactions[1].from, "unknown");
    assert_eq!(page.total_pages, 2);
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_unparseable_payload_fails_without_retry() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_raw_body("<html>maintenance</html>", 1).await;

    let client = create_client(mock.upstream_config());
    let err = client.fetch_page(&PageKey::new(1, dec!(100))).await.unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(err.last_status, None);
    mock.assert_all().await;
}

#[tokio::test]
#[serial]
async fn test_missing_total_pages_defaults_to_one() {
    let mut mock = UpstreamMockBuilder::new().await;
    let body = json!({ "transactions": create_provider_records(2, 1_000.0) });
    mock.mock_page(1, "100", &body, 1).await;

    let client = create_client(mock.upstream_config());
    let page = client.fetch_page(&PageKey::new(1, dec!(100))).await.expect("page");

    assert_eq!(page.total_pages, 1);
    assert_eq!(page.transactions.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_unreachable_provider_reports_unavailable() {
    // Nothing listens on port 9 of localhost.
    let config = UpstreamConfig {
        connect_timeout_ms: 200,
        timeout_ms: 500,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        },
        ..UpstreamConfig::with_base_url("http://127.0.0.1:9")
    };
    let client = create_client(config);

    let err = client.fetch_page(&PageKey::new(1, dec!(100))).await.unwrap_err();
    assert_eq!(err.attempts, 3);
    assert_eq!(err.last_status, None);
}
