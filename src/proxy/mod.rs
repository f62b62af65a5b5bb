//! Core HTTP request forwarding.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every request not answered by the health endpoint and relays it to the
//! single upstream. The pipeline is explicit: compute outbound headers
//! ([`headers`]), prepare the body ([`body`]), send through the pool
//! ([`pool`]) under the request deadline, then either relay the response
//! as a stream, splice an upgraded connection ([`upgrade`]), or classify
//! the failure ([`failure`]).

pub mod body;
pub mod failure;
pub mod headers;
pub mod pool;
pub mod upgrade;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::server::AppState;
use body::OutboundBody;
use failure::{FailureKind, ProxyError, RequestLabel};
use headers::InboundContext;
use pool::LeasedBody;

/// Upstream URI for an inbound request: upstream base path joined with the
/// inbound path, plus the inbound query string.
pub fn target_uri(upstream: &Url, inbound: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
    let authority = headers::upstream_authority(upstream).unwrap_or_default();
    let base_path = upstream.path().trim_end_matches('/');
    let path_and_query = inbound.path_and_query().map_or("/", |pq| pq.as_str());
    format!(
        "{}://{authority}{base_path}{path_and_query}",
        upstream.scheme()
    )
    .parse()
}

fn record_failure(state: &AppState, err: ProxyError) -> Response {
    err.log();
    let counter = match err.kind() {
        FailureKind::Timeout => &state.stats.timeouts,
        FailureKind::ConnectionFailure => &state.stats.connection_failures,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    err.into_response()
}

fn internal_failure(request: &RequestLabel, error: &dyn std::fmt::Display) -> Response {
    tracing::error!(
        failure = "internal",
        method = %request.method,
        path = %request.path,
        error = %error,
        "failed to prepare upstream request"
    );
    failure::internal_error_response()
}

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
) -> Response {
    let config = Arc::clone(&state.config);
    let label = RequestLabel {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
    };

    let is_upgrade = upgrade::is_upgrade_request(req.headers());
    let client_upgrade = is_upgrade.then(|| hyper::upgrade::on(&mut req));
    let (parts, inbound_body) = req.into_parts();

    let inbound = InboundContext {
        headers: &parts.headers,
        query: parts.uri.query(),
        client_ip: Some(addr.ip()),
        protocol: parts.uri.scheme_str().unwrap_or("http"),
        upgrade: is_upgrade,
    };
    let mut outbound_headers = headers::build_outbound_headers(&inbound, &config.upstream_url);

    let target = match target_uri(&config.upstream_url, &parts.uri) {
        Ok(uri) => uri,
        Err(e) => return internal_failure(&label, &e),
    };

    let outbound_body =
        match body::prepare_body(&parts.headers, inbound_body, config.max_json_body).await {
            Ok(prepared) => prepared,
            Err(e) => return internal_failure(&label, &e),
        };
    if let OutboundBody::Json(ref payload) = outbound_body {
        headers::apply_json_payload(&mut outbound_headers, payload.len());
    }

    let mut outbound = match hyper::Request::builder()
        .method(parts.method.clone())
        .uri(target)
        .body(outbound_body.into_body())
    {
        Ok(r) => r,
        Err(e) => return internal_failure(&label, &e),
    };
    *outbound.headers_mut() = outbound_headers;

    if config.log_traffic {
        tracing::info!(
            "{} {} -> {}{}",
            label.method,
            label.path,
            config.upstream,
            label.path
        );
    }

    let sent = tokio::time::timeout(config.timeout, state.pool.send(outbound)).await;
    let (mut response, lease) = match sent {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            let err = ProxyError::from_transport(&e, label, config.timeout, &config.upstream);
            return record_failure(&state, err);
        }
        Err(_) => {
            let err = ProxyError::deadline_elapsed(label, config.timeout);
            return record_failure(&state, err);
        }
    };

    let status = response.status();
    if config.log_traffic {
        tracing::info!("{} {} <- {}", label.method, label.path, status.as_u16());
    }

    if status == StatusCode::SWITCHING_PROTOCOLS {
        let Some(client_upgrade) = client_upgrade else {
            let err = ProxyError::unrequested_upgrade(label, &config.upstream);
            return record_failure(&state, err);
        };
        state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        let upstream_upgrade = hyper::upgrade::on(&mut response);
        upgrade::spawn_tunnel(client_upgrade, upstream_upgrade, lease, label);
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Body::empty());
    }
    state.stats.forwarded.fetch_add(1, Ordering::Relaxed);

    let (mut parts, incoming) = response.into_parts();
    headers::strip_response_connection_headers(&mut parts.headers);
    Response::from_parts(parts, Body::new(LeasedBody::new(incoming, lease)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_joins_base_path_and_query() {
        let upstream = Url::parse("http://backend:9090/api/").unwrap();
        let inbound: Uri = "/users/42?expand=true&api-key=k".parse().unwrap();
        assert_eq!(
            target_uri(&upstream, &inbound).unwrap(),
            "http://backend:9090/api/users/42?expand=true&api-key=k"
        );
    }

    #[test]
    fn target_for_root_upstream_keeps_path() {
        let upstream = Url::parse("https://api.example.com").unwrap();
        let inbound: Uri = "/".parse().unwrap();
        assert_eq!(
            target_uri(&upstream, &inbound).unwrap(),
            "https://api.example.com/"
        );
    }

    #[test]
    fn target_keeps_explicit_port_and_ipv6_host() {
        let upstream = Url::parse("http://[::1]:3000").unwrap();
        let inbound: Uri = "/health/deep".parse().unwrap();
        assert_eq!(
            target_uri(&upstream, &inbound).unwrap(),
            "http://[::1]:3000/health/deep"
        );
    }
}
