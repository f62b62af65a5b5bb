//! Startup configuration for the proxy.
//!
//! Values are read once by clap (flags or environment variables), checked
//! by [`validation`], and frozen into [`ProxyConfig`] and [`ServerConfig`].
//! The proxy config is shared behind an `Arc` with the transport pool and
//! the forwarder; nothing in the request path reads the environment.

pub mod validation;

use std::time::Duration;

use url::Url;

use crate::cli::{RunArgs, UpstreamArgs};
use crate::error::ApiProxyError;

/// Environment tag that turns on per-request traffic logging.
pub const DEVELOPMENT: &str = "development";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream URL exactly as configured, used in logs and error bodies.
    pub upstream: String,
    pub upstream_url: Url,
    /// Deadline covering connect and the first response byte.
    pub timeout: Duration,
    pub keep_alive: bool,
    /// Log `method path -> target` / `method path <- status` lines.
    pub log_traffic: bool,
    /// Largest JSON body buffered for re-serialization.
    pub max_json_body: usize,
}

impl ProxyConfig {
    pub fn from_upstream_args(args: &UpstreamArgs) -> Result<Self, ApiProxyError> {
        let upstream_url = validation::validate(args)
            .map_err(|errors| ApiProxyError::ConfigValidation { errors })?;

        Ok(Self {
            upstream: args.upstream_url.clone(),
            upstream_url,
            timeout: Duration::from_millis(args.timeout),
            keep_alive: args.keep_alive,
            log_traffic: false,
            max_json_body: 1024,
        })
    }

    pub fn from_run_args(args: &RunArgs) -> Result<Self, ApiProxyError> {
        let mut config = Self::from_upstream_args(&args.upstream)?;
        config.log_traffic = args.environment == DEVELOPMENT;
        config.max_json_body = args.max_json_body;
        Ok(config)
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

impl ServerConfig {
    #[must_use]
    pub fn from_run_args(args: &RunArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            environment: args.environment.clone(),
        }
    }
}
