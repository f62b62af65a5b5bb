//! Shared fixtures: a stub upstream that reports what it received, and a
//! proxy instance pointed at it.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_proxy::config::ProxyConfig;
use api_proxy::error::ApiProxyError;
use api_proxy::server::{self, AppState};
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::any;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl Echo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(name)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        map.entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": map,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn raw(body: Bytes) -> impl IntoResponse {
    ([("content-type", "application/octet-stream")], body)
}

#[derive(Deserialize)]
struct SlowParams {
    ms: u64,
}

async fn slow(Query(params): Query<SlowParams>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    "done"
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [("x-upstream-a", "1")],
        AppendHeaders([("set-cookie", "a=1"), ("set-cookie", "b=2")]),
        "teapot",
    )
}

pub async fn start_upstream() -> SocketAddr {
    let router = Router::new()
        .route("/raw", any(raw))
        .route("/slow", any(slow))
        .route("/status/{code}", any(status))
        .fallback(echo);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn proxy_config(upstream: &str, timeout: Duration) -> ProxyConfig {
    ProxyConfig {
        upstream: upstream.to_string(),
        upstream_url: url::Url::parse(upstream).unwrap(),
        timeout,
        keep_alive: true,
        log_traffic: true,
        max_json_body: 1024,
    }
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub shutdown: Option<oneshot::Sender<()>>,
    pub handle: JoinHandle<Result<(), ApiProxyError>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn begin_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_proxy_with(config: ProxyConfig, grace: Duration) -> TestProxy {
    let state = Arc::new(AppState::new(config));
    let router = server::build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server::serve(
        listener,
        router,
        async move {
            let _ = shutdown_rx.await;
        },
        grace,
    ));

    TestProxy {
        addr,
        state,
        shutdown: Some(shutdown_tx),
        handle,
    }
}

pub async fn start_proxy(upstream: SocketAddr, timeout: Duration) -> TestProxy {
    start_proxy_with(
        proxy_config(&format!("http://{upstream}"), timeout),
        server::SHUTDOWN_GRACE,
    )
    .await
}
