//! Request body handling.
//!
//! Only a small JSON body (`Content-Type: application/json` with a declared
//! `Content-Length` no larger than the configured limit) is read into
//! memory. When it parses to a non-empty object it is re-serialized and the
//! forwarder sends that payload with fresh content headers. Every other
//! body, including chunked uploads of unknown size, streams through
//! untouched.

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderMap;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};

#[derive(Debug)]
pub enum OutboundBody {
    /// Re-serialized JSON object; content headers must be rewritten.
    Json(Bytes),
    /// Body that was read for inspection but is forwarded byte-for-byte.
    Buffered(Bytes),
    /// Original stream, never buffered.
    Stream(Body),
}

impl OutboundBody {
    #[must_use]
    pub fn into_body(self) -> Body {
        match self {
            Self::Json(bytes) | Self::Buffered(bytes) => Body::from(bytes),
            Self::Stream(body) => body,
        }
    }
}

#[must_use]
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

#[must_use]
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Whether the body qualifies for buffering.
#[must_use]
pub fn should_buffer(headers: &HeaderMap, limit: usize) -> bool {
    is_json(headers)
        && declared_length(headers)
            .is_some_and(|len| usize::try_from(len).is_ok_and(|len| len <= limit))
}

/// Re-serialize `raw` if it is a JSON object with at least one field.
#[must_use]
pub fn reserialize_json_object(raw: &[u8]) -> Option<Bytes> {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_))
            if value.as_object().is_some_and(|map| !map.is_empty()) =>
        {
            serde_json::to_vec(&value).ok().map(Bytes::from)
        }
        _ => None,
    }
}

pub async fn prepare_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<OutboundBody, axum::BoxError> {
    if !should_buffer(headers, limit) {
        return Ok(OutboundBody::Stream(body));
    }

    let raw = Limited::new(body, limit).collect().await?.to_bytes();
    Ok(reserialize_json_object(&raw).map_or(OutboundBody::Buffered(raw), OutboundBody::Json))
}
