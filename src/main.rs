//! Proxy bootstrap.
//!
//! Startup order: logging, configuration, listener bind, optional
//! metrics exporter, serve. Exit codes: 0 on normal shutdown, 1 on a
//! fatal startup error, 2 when a signal terminated the process.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;

use xiino_proxy::{config, lifecycle, observability, HttpServer};

#[tokio::main]
async fn main() -> ExitCode {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    observability::logging::init(&default_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "xiino-proxy starting");

    let config = config::from_env();
    tracing::info!(
        bind_address = %config.server.bind_address(),
        max_page_size_kb = config.http.max_page_size_kb,
        rate_limit_per_min = config.security.max_requests_per_min,
        dither_priority = ?config.image.dither_priority,
        "Configuration loaded"
    );

    let listener = match TcpListener::bind(config.server.bind_address()).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(address = %config.server.bind_address(), %error, "Failed to bind");
            return ExitCode::from(1);
        }
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let server = match HttpServer::new(config) {
        Ok(server) => server,
        Err(error) => {
            tracing::error!(%error, "Failed to initialize server");
            return ExitCode::from(1);
        }
    };

    let signalled = Arc::new(AtomicBool::new(false));
    let shutdown = {
        let signalled = signalled.clone();
        async move {
            lifecycle::shutdown_signal().await;
            signalled.store(true, Ordering::SeqCst);
        }
    };

    if let Err(error) = server.run(listener, shutdown).await {
        tracing::error!(%error, "Server error");
        return ExitCode::from(1);
    }

    tracing::info!("Shutdown complete");
    if signalled.load(Ordering::SeqCst) {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
