//! Integration tests for the whale runtime against a mocked provider.
//!
//! These tests verify the runtime's behavioral contracts end to end:
//! - Builder validation catches configuration errors early
//! - Warm-up pins the hot keys so the first request is served from cache
//! - Concurrent requests for one key cost a single provider call
//! - An unavailable provider never fails startup or a query
//! - Shutdown reaches every receiver
//!
//! Tests use `tokio::time::timeout` to prevent hanging on failures.

use crate::mock_infrastructure::{
    create_provider_page, create_provider_records, UpstreamMockBuilder,
};
use serial_test::serial;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::time::{timeout, Duration};
use whale_core::{
    cache::EntryState,
    config::AppConfig,
    runtime::{RuntimeError, WhaleRuntime, WhaleRuntimeBuilder},
    types::PageKey,
    upstream::UpstreamConfig,
};

/// Creates a configuration pointing at `mock` with the given warm-up keys.
fn create_test_runtime_config(mock: &UpstreamMockBuilder, warm_up_keys: &[&str]) -> AppConfig {
    let mut config = AppConfig { upstream: mock.upstream_config(), ..Default::default() };
    config.cache.warm_up_keys = warm_up_keys.iter().map(ToString::to_string).collect();
    config.cache.warm_up_timeout_seconds = 5;
    config
}

fn build_runtime(config: AppConfig) -> WhaleRuntime {
    WhaleRuntimeBuilder::new().with_config(config).build().expect("Failed to build runtime")
}

#[tokio::test]
#[serial]
async fn test_builder_missing_config_returns_error() {
    let result = WhaleRuntimeBuilder::new().build();

    assert!(matches!(result, Err(RuntimeError::MissingConfig)));
}

#[tokio::test]
#[serial]
async fn test_builder_rejects_invalid_upstream_url() {
    let config = AppConfig {
        upstream: UpstreamConfig::with_base_url("ftp://provider.test"),
        ..Default::default()
    };

    let result = WhaleRuntimeBuilder::new().with_config(config).build();

    match result {
        Err(RuntimeError::ConfigValidation(_)) => {}
        Err(e) => panic!("Expected ConfigValidation error, got: {e:?}"),
        Ok(_) => panic!("Builder should not accept a non-http upstream"),
    }
}

#[tokio::test]
#[serial]
async fn test_builder_rejects_bad_warm_up_key() {
    let mock = UpstreamMockBuilder::new().await;
    let config = create_test_runtime_config(&mock, &["first-page"]);

    let result = WhaleRuntimeBuilder::new().with_config(config).build();

    assert!(result.is_err(), "Builder should fail on an unparseable warm-up key");
}

#[tokio::test]
#[serial]
async fn test_warm_up_serves_first_request_from_cache() {
    let mut mock = UpstreamMockBuilder::new().await;
    let body = create_provider_page(create_provider_records(5, 150_000.0), 9);
    mock.mock_page(1, "100", &body, 1).await;

    let runtime = build_runtime(create_test_runtime_config(&mock, &["1:100"]));

    let report = runtime.warm_up().await.expect("warm-up should finish in time");
    assert!(report.is_complete());
    assert_eq!(report.succeeded, vec![PageKey::new(1, 100.into())]);

    let key = PageKey::new(1, 100.into());
    assert!(runtime.cache().is_pinned(&key));
    assert_eq!(runtime.cache().state(&key), EntryState::Fresh);

    let response = runtime.query_service().query(None, None).await;
    assert_eq!(response.transactions.len(), 5);
    assert_eq!(response.total_pages, 9);

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_warm_up_failure_does_not_block_startup() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_status(503, 6).await;

    let runtime = build_runtime(create_test_runtime_config(&mock, &["1:100"]));

    let report = runtime.warm_up().await.expect("warm-up should finish in time");
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);

    // The key is still pinned and a later request retries the provider.
    let response = runtime.query_service().query(Some("1"), Some("100")).await;
    assert!(response.transactions.is_empty());
    assert_eq!(response.total_pages, 1);

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_concurrent_queries_share_one_fetch() {
    let mut mock = UpstreamMockBuilder::new().await;
    let body = create_provider_page(create_provider_records(2, 1_000_000.0), 3);
    mock.mock_page(4, "500000", &body, 1).await;

    let runtime = build_runtime(create_test_runtime_config(&mock, &[]));
    let service = runtime.query_service().clone();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.query(Some("4"), Some("500000")).await })
        })
        .collect();

    for task in tasks {
        let response = timeout(Duration::from_secs(5), task)
            .await
            .expect("query should complete")
            .expect("query task should not panic");
        assert_eq!(response.transactions.len(), 2);
        assert_eq!(response.total_pages, 3);
    }

    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_distinct_keys_fetch_independently() {
    let mut mock = UpstreamMockBuilder::new().await;
    mock.mock_page(1, "100", &create_provider_page(create_provider_records(1, 200.0), 1), 1)
        .await;
    mock.mock_page(2, "100", &create_provider_page(create_provider_records(3, 200.0), 2), 1)
        .await;
    mock.mock_page(1, "2500.5", &create_provider_page(create_provider_records(4, 3_000.0), 1), 1)
        .await;

    let runtime = build_runtime(create_test_runtime_config(&mock, &[]));
    let service = runtime.query_service();

    assert_eq!(service.query(Some("1"), Some("100")).await.transactions.len(), 1);
    assert_eq!(service.query(Some("2"), Some("100")).await.transactions.len(), 3);
    assert_eq!(service.query(Some("1"), Some("2500.50")).await.transactions.len(), 4);

    // Equivalent parameter spellings address the cached entries.
    assert_eq!(service.query(Some("1"), Some("100.000")).await.transactions.len(), 1);
    assert_eq!(service.query(Some("02"), None).await.transactions.len(), 3);

    assert_eq!(runtime.cache().len(), 3);
    mock.assert_all().await;
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_shutdown_signal_broadcast_to_all_receivers() {
    let mock = UpstreamMockBuilder::new().await;
    let runtime = build_runtime(create_test_runtime_config(&mock, &[]));

    let received_count = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let mut rx = runtime.shutdown_receiver();
            let count = received_count.clone();
            tokio::spawn(async move {
                if rx.recv().await.is_ok() {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    // Give tasks time to start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(2), runtime.shutdown())
        .await
        .expect("shutdown should not hang on background tasks");

    for task in tasks {
        timeout(Duration::from_secs(2), task)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    assert_eq!(received_count.load(Ordering::SeqCst), 3, "All 3 receivers should be notified");
}
