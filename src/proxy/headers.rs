//! Header Rewriter.
//!
//! [`build_outbound_headers`] derives the header set sent upstream from the
//! inbound request: connection-scoped headers are dropped, `Host` is
//! rewritten to the upstream authority, and the forwarding headers
//! (`X-Forwarded-Host`, `X-Forwarded-For`, `X-Forwarded-Proto`) replace any
//! inbound value rather than adding a second one. Correlation id and API
//! key are carried over. [`apply_json_payload`] fixes up the content headers
//! when a small JSON body was buffered and re-serialized.

use std::net::IpAddr;
use std::sync::LazyLock;

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");
pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

const API_KEY_QUERY_PARAM: &str = "api-key";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "proxy-connection",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

// Headers an upgrade handshake needs to reach the upstream.
static UPGRADE_KEEP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    ["connection", "upgrade"]
        .iter()
        .filter_map(|name| name.parse::<HeaderName>().ok())
        .collect()
});

/// What the rewriter needs to know about one inbound request.
#[derive(Debug, Clone, Copy)]
pub struct InboundContext<'a> {
    pub headers: &'a HeaderMap,
    pub query: Option<&'a str>,
    pub client_ip: Option<IpAddr>,
    /// Protocol the client actually used to reach the proxy.
    pub protocol: &'a str,
    pub upgrade: bool,
}

/// Join every value of `name` the way a single comma-separated header reads.
fn joined_value(headers: &HeaderMap, name: &HeaderName) -> Option<HeaderValue> {
    let mut values = headers.get_all(name).iter();
    let first = values.next()?;
    let rest: Vec<&HeaderValue> = values.collect();
    if rest.is_empty() {
        return Some(first.clone());
    }
    let mut joined = first.as_bytes().to_vec();
    for value in rest {
        joined.extend_from_slice(b", ");
        joined.extend_from_slice(value.as_bytes());
    }
    HeaderValue::from_bytes(&joined).ok()
}

fn api_key_from_query(query: &str) -> Option<HeaderValue> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == API_KEY_QUERY_PARAM)
        .and_then(|(_, value)| HeaderValue::from_str(&value).ok())
}

/// `host[:port]` of the upstream, as sent in the outbound `Host` header.
#[must_use]
pub fn upstream_authority(upstream: &Url) -> Option<String> {
    let host = upstream.host_str()?;
    Some(
        upstream
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}")),
    )
}

pub fn build_outbound_headers(inbound: &InboundContext<'_>, upstream: &Url) -> HeaderMap {
    let original = inbound.headers;
    let mut headers = original.clone();

    for name in HOP_BY_HOP.iter() {
        if inbound.upgrade && UPGRADE_KEEP.contains(name) {
            continue;
        }
        headers.remove(name);
    }

    // X-Forwarded-Host: the Host the client targeted
    if let Some(original_host) = original.get(HOST) {
        headers.insert(X_FORWARDED_HOST, original_host.clone());
    }

    // X-Forwarded-For: an existing chain wins over the socket address
    let client_ip = joined_value(original, &X_FORWARDED_FOR).or_else(|| {
        inbound
            .client_ip
            .and_then(|ip| HeaderValue::from_str(&ip.to_string()).ok())
    });
    match client_ip {
        Some(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        None => {
            headers.remove(X_FORWARDED_FOR);
        }
    }

    // X-Forwarded-Proto
    let proto = original
        .get(&X_FORWARDED_PROTO)
        .cloned()
        .or_else(|| HeaderValue::from_str(inbound.protocol).ok());
    if let Some(proto) = proto {
        headers.insert(X_FORWARDED_PROTO, proto);
    }

    // Correlation ID passes through unchanged
    if let Some(correlation_id) = original.get(&X_CORRELATION_ID) {
        headers.insert(X_CORRELATION_ID, correlation_id.clone());
    }

    // API key: header first, then the `api-key` query parameter
    let api_key = original
        .get(&X_API_KEY)
        .cloned()
        .or_else(|| inbound.query.and_then(api_key_from_query));
    if let Some(api_key) = api_key {
        headers.insert(X_API_KEY, api_key);
    }

    // Rewrite Host to the upstream
    if let Some(authority) = upstream_authority(upstream) {
        if let Ok(value) = HeaderValue::from_str(&authority) {
            headers.insert(HOST, value);
        }
    }

    headers
}

/// Set the content headers for a re-serialized JSON payload of `len` bytes.
pub fn apply_json_payload(headers: &mut HeaderMap, len: usize) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
}

/// Drop the headers describing the upstream connection from a relayed response.
pub fn strip_response_connection_headers(headers: &mut HeaderMap) {
    headers.remove(axum::http::header::CONNECTION);
    if let Ok(name) = "keep-alive".parse::<HeaderName>() {
        headers.remove(name);
    }
}
