//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the frozen proxy
//! config, the upstream pool, counters and uptime), [`build_router`] for
//! constructing the Axum router with middleware layers, [`shutdown_signal`]
//! for SIGTERM / Ctrl+C handling, and [`serve`], which drains in-flight
//! requests for at most a grace period once shutdown starts.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::ApiProxyError;
use crate::health::health_handler;
use crate::middleware;
use crate::proxy;
use crate::proxy::pool::UpstreamPool;

/// How long in-flight requests may run after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub timeouts: AtomicU64,
    pub connection_failures: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
        }
    }
}

pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub pool: UpstreamPool,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        let pool = UpstreamPool::new(&config);
        Self {
            config: Arc::new(config),
            pool,
            start_time: Instant::now(),
            stats: Stats::new(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Only GET/HEAD are answered locally; other methods on /health are proxied.
        .route(
            "/health",
            get(health_handler).fallback(proxy::forward_handler),
        )
        .fallback(proxy::forward_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(middleware::panic_response)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

/// Serve `router` until `shutdown` resolves, then stop accepting and give
/// in-flight requests up to `grace` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    grace: Duration,
) -> Result<(), ApiProxyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (draining_tx, mut draining_rx) = tokio::sync::watch::channel(());
    let signal = async move {
        shutdown.await;
        let _ = draining_tx.send(());
    };

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return Ok(result?),
        Ok(()) = draining_rx.changed() => {}
    }

    tracing::info!(
        grace_secs = grace.as_secs(),
        "shutting down, waiting for in-flight requests"
    );

    match tokio::time::timeout(grace, server).await {
        Ok(result) => {
            result?;
            tracing::info!("shutdown complete");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(grace_secs = grace.as_secs(), "forcing shutdown");
            Err(ApiProxyError::ShutdownTimeout { grace })
        }
    }
}
