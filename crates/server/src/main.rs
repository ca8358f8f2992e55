use anyhow::Result;
use axum::serve;
use server::{
    middleware::RateLimitState,
    router::{self, AppState},
};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whale_core::{config::AppConfig, runtime::WhaleRuntime};

/// Builds the log filter. `RUST_LOG` wins when set, otherwise the configured level
/// applies to this workspace's crates and everything else logs at `warn`.
fn log_filter(config: &AppConfig) -> EnvFilter {
    let level = config.logging.level.as_str();
    let default_filter = format!("warn,whale_core={level},server={level}");

    match std::env::var("RUST_LOG") {
        Ok(value) if value == "debug" || value == "trace" => {
            EnvFilter::new(format!("warn,whale_core={value},server={value}"))
        }
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new(&default_filter)),
        Err(_) => EnvFilter::new(default_filter),
    }
}

/// Initializes the logging system based on the configuration.
fn init_logging(config: &AppConfig) {
    let registry = tracing_subscriber::registry().with(log_filter(config));

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting whale transaction feed");
    debug!(
        upstream = %config.upstream.base_url,
        bind_port = config.server.bind_port,
        warm_up_keys = config.cache.warm_up_keys.len(),
        "Configuration loaded"
    );

    let addr = config.socket_addr()?;
    let trust_forwarded_for = config.rate_limit.trust_forwarded_for;

    let runtime = WhaleRuntime::builder()
        .with_config(config)
        .build()
        .map_err(|e| anyhow::anyhow!("Runtime initialization failed: {e}"))?;

    if let Some(report) = runtime.warm_up().await {
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Cache warm-up finished"
        );
    }

    let state =
        AppState::new(runtime.query_service().clone(), runtime.metrics_collector().clone());
    let rate_limit = RateLimitState::new(
        runtime.rate_limiter().clone(),
        runtime.metrics_collector().clone(),
        trust_forwarded_for,
    );
    let app = router::create_app(state, rate_limit);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Whale feed listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    runtime.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");

                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
