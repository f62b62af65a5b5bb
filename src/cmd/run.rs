//! `api-proxy run`: start the proxy server.
//!
//! Freezes the configuration, builds the upstream pool and router, and
//! serves until SIGTERM / Ctrl+C, then drains in-flight requests for at
//! most [`SHUTDOWN_GRACE`](crate::server::SHUTDOWN_GRACE).

use std::net::SocketAddr;
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::{ProxyConfig, ServerConfig};
use crate::error::ApiProxyError;
use crate::logging;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), ApiProxyError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let proxy_config = ProxyConfig::from_run_args(&args)?;
    let server_config = ServerConfig::from_run_args(&args);

    let state = Arc::new(AppState::new(proxy_config));
    let router = server::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        environment = %server_config.environment,
        upstream = %state.config.upstream,
        transport = state.pool.transport().as_str(),
        keep_alive = state.config.keep_alive,
        timeout_ms = state.config.timeout_ms(),
        "api-proxy started"
    );

    server::serve(
        listener,
        router,
        server::shutdown_signal(),
        server::SHUTDOWN_GRACE,
    )
    .await?;

    tracing::info!("api-proxy stopped");
    Ok(())
}
