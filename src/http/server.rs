//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware (tracing, timeout,
//!   request ID)
//! - Construct the shared subsystems (fetcher, transcoder, cookie
//!   bridge, rate limiter, worker pool)
//! - Serve with graceful shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::cookies::CookieBridge;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::html::HtmlTranscoder;
use crate::http::handler::proxy_handler;
use crate::http::request::request_id_middleware;
use crate::image::ImageProcessor;
use crate::security::RateLimiter;
use crate::workers::WorkerPool;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub fetcher: Arc<Fetcher>,
    pub transcoder: Arc<HtmlTranscoder>,
    pub processor: ImageProcessor,
    pub cookies: Arc<CookieBridge>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// HTTP server for the transcoding proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = WorkerPool::new(cores);
        let cookies = Arc::new(CookieBridge::new());
        let fetcher = Arc::new(Fetcher::new(
            &config.http,
            &config.security,
            &config.image,
            cookies.clone(),
        )?);
        let processor = ImageProcessor::new(config.image.clone(), workers.clone());
        let transcoder = Arc::new(HtmlTranscoder::new(
            fetcher.clone(),
            processor.clone(),
            workers,
            config.image.max_data_url_size,
            cores,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.security.max_requests_per_min));

        let state = AppState {
            config: Arc::new(config.clone()),
            fetcher,
            transcoder,
            processor,
            cookies,
            rate_limiter,
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        // The outer timeout covers fetch plus image processing; the
        // budget deadline inside is slightly tighter, so pages normally
        // degrade gracefully before this layer fires.
        let request_timeout = Duration::from_secs(
            config.http.timeout_secs + config.image.processing_timeout_secs + 5,
        );
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown future resolves.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}
