//! Integration tests for the health endpoint and graceful shutdown.

mod common;

use std::time::Duration;

use api_proxy::error::ApiProxyError;
use api_proxy::health::HealthResponse;
use common::{proxy_config, start_proxy, start_proxy_with, start_upstream};

#[tokio::test]
async fn health_endpoint_reports_configuration() {
    let upstream = start_upstream().await;
    let proxy = start_proxy(upstream, Duration::from_millis(1500)).await;

    let resp = reqwest::get(proxy.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "api-proxy");
    assert_eq!(health.upstream, format!("http://{upstream}"));
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert!(health.keep_alive);
    assert_eq!(health.timeout_ms, 1500);
    assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());
    assert_eq!(health.stats.forwarded, 0);
}

#[tokio::test]
async fn health_does_not_touch_upstream() {
    let dead = common::closed_port().await;
    let proxy = start_proxy_with(
        proxy_config(&format!("http://{dead}"), Duration::from_secs(1)),
        Duration::from_secs(1),
    )
    .await;

    let resp = reqwest::get(proxy.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn graceful_shutdown_stops_accepting() {
    let upstream = start_upstream().await;
    let mut proxy = start_proxy(upstream, Duration::from_secs(5)).await;

    let url = proxy.url("/health");
    assert!(reqwest::get(&url).await.is_ok());

    proxy.begin_shutdown();
    proxy.handle.await.unwrap().unwrap();

    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn in_flight_request_completes_after_shutdown_signal() {
    let upstream = start_upstream().await;
    let mut proxy = start_proxy(upstream, Duration::from_secs(5)).await;

    let url = proxy.url("/slow?ms=500");
    let in_flight = tokio::spawn(async move {
        let resp = reqwest::get(url).await.unwrap();
        (resp.status(), resp.text().await.unwrap())
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    proxy.begin_shutdown();

    let (status, body) = in_flight.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, "done");
    proxy.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_is_forced_after_grace_period() {
    let upstream = start_upstream().await;
    let mut proxy = start_proxy_with(
        proxy_config(&format!("http://{upstream}"), Duration::from_secs(30)),
        Duration::from_millis(200),
    )
    .await;

    let url = proxy.url("/slow?ms=5000");
    let _in_flight = tokio::spawn(async move { reqwest::get(url).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    proxy.begin_shutdown();

    let result = proxy.handle.await.unwrap();
    assert!(matches!(
        result,
        Err(ApiProxyError::ShutdownTimeout { grace }) if grace == Duration::from_millis(200)
    ));
}
