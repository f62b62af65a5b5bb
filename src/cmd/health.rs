//! `api-proxy health`: query the `/health` endpoint of a running proxy.
//!
//! Prints a short summary, or the raw JSON with `--json`. A non-2xx answer
//! is an error so the command can back a container health check.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::Uri;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::ApiProxyError;
use crate::health::HealthResponse;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HEALTH_BODY: usize = 64 * 1024;

fn http_error(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> ApiProxyError {
    ApiProxyError::HttpRequest {
        source: source.into(),
    }
}

/// `<base>/health`, tolerating a trailing slash on `base`.
fn health_uri(base: &str) -> Result<Uri, ApiProxyError> {
    format!("{}/health", base.trim_end_matches('/'))
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| ApiProxyError::UriParse {
            source: Box::new(e),
        })
}

async fn probe(uri: Uri) -> Result<Bytes, ApiProxyError> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(PROBE_TIMEOUT));
    let client: Client<_, Empty<Bytes>> = Client::builder(TokioExecutor::new()).build(connector);

    let response = tokio::time::timeout(PROBE_TIMEOUT, client.get(uri))
        .await
        .map_err(|_| http_error(format!("no answer within {}s", PROBE_TIMEOUT.as_secs())))?
        .map_err(http_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiProxyError::HealthCheckFailed(status));
    }

    Ok(Limited::new(response.into_body(), MAX_HEALTH_BODY)
        .collect()
        .await
        .map_err(http_error)?
        .to_bytes())
}

fn format_uptime(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    match (hours, minutes) {
        (0, 0) => format!("{secs}s"),
        (0, _) => format!("{minutes}m {secs}s"),
        _ => format!("{hours}h {minutes}m {secs}s"),
    }
}

fn render_summary(health: &HealthResponse, url: &str) -> String {
    let stats = &health.stats;
    let mut out = format!("\u{2713} {} is {} ({url})\n", health.service, health.status);
    let _ = writeln!(out, "  version:   {}", health.version);
    let _ = writeln!(out, "  uptime:    {}", format_uptime(health.uptime_seconds));
    let _ = writeln!(out, "  upstream:  {}", health.upstream);
    let _ = writeln!(
        out,
        "  pooling:   keep-alive {}, timeout {}ms",
        if health.keep_alive { "on" } else { "off" },
        health.timeout_ms
    );
    let _ = write!(
        out,
        "  requests:  {} forwarded, {} timed out, {} unreachable",
        stats.forwarded, stats.timeouts, stats.connection_failures
    );
    out
}

pub async fn execute(args: HealthArgs) -> Result<(), ApiProxyError> {
    let body = probe(health_uri(&args.url)?).await?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => println!("{}", render_summary(&health, &args.url)),
        Err(e) => {
            eprintln!("unrecognised health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::StatsResponse;

    #[test]
    fn health_uri_ignores_trailing_slash() {
        assert_eq!(
            health_uri("http://localhost:3001/").unwrap(),
            "http://localhost:3001/health"
        );
        assert!(health_uri("not a url").is_err());
    }

    #[test]
    fn uptime_uses_largest_units() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
        assert_eq!(format_uptime(3600), "1h 0m 0s");
    }

    #[test]
    fn summary_lists_settings_and_counters() {
        let health = HealthResponse {
            status: "ok".into(),
            service: "api-proxy".into(),
            upstream: "http://backend:8080".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            version: "0.1.0".into(),
            uptime_seconds: 61,
            keep_alive: false,
            timeout_ms: 30_000,
            stats: StatsResponse {
                forwarded: 7,
                timeouts: 1,
                connection_failures: 2,
            },
        };

        let summary = render_summary(&health, "http://localhost:3001");
        assert!(summary.starts_with("\u{2713} api-proxy is ok (http://localhost:3001)"));
        assert!(summary.contains("uptime:    1m 1s"));
        assert!(summary.contains("keep-alive off, timeout 30000ms"));
        assert!(summary.contains("7 forwarded, 1 timed out, 2 unreachable"));
    }
}
