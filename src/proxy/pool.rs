//! Upstream Transport Pool.
//!
//! Wraps the connection-pooled hyper client used for every upstream call.
//! With keep-alive enabled, idle connections are retained for
//! [`KEEP_ALIVE_PERIOD`], at most [`MAX_FREE_SOCKETS`] stay idle and at most
//! [`MAX_SOCKETS`] are in use at once. With keep-alive disabled nothing is
//! retained and every request dials a fresh connection.
//!
//! Socket management itself (checkout, return to the idle set, discard on
//! error or cancellation) is left to `hyper-util`'s legacy client. The
//! concurrency cap is a semaphore whose permit travels with the response
//! body, so a connection counts as busy until its body is fully relayed.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::config::ProxyConfig;

pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_millis(1000);
pub const MAX_SOCKETS: usize = 50;
pub const MAX_FREE_SOCKETS: usize = 10;

pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Body>;

/// Client transport picked from the upstream URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Https,
}

impl Transport {
    #[must_use]
    pub fn for_url(url: &Url) -> Self {
        if url.scheme() == "https" {
            Self::Https
        } else {
            Self::Http
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub keep_alive: bool,
    pub idle_timeout: Duration,
    pub max_sockets: usize,
    pub max_free_sockets: usize,
    pub connect_timeout: Duration,
}

impl PoolSettings {
    #[must_use]
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            keep_alive: config.keep_alive,
            idle_timeout: KEEP_ALIVE_PERIOD,
            max_sockets: MAX_SOCKETS,
            max_free_sockets: MAX_FREE_SOCKETS,
            connect_timeout: config.timeout,
        }
    }
}

#[derive(Clone)]
pub struct UpstreamPool {
    client: HttpClient,
    transport: Transport,
    // None when keep-alive is off: unpooled requests are not capped.
    limiter: Option<Arc<Semaphore>>,
}

impl UpstreamPool {
    #[must_use]
    pub fn new(config: &ProxyConfig) -> Self {
        let settings = PoolSettings::from_config(config);
        Self {
            client: build_http_client(&settings),
            transport: Transport::for_url(&config.upstream_url),
            limiter: settings
                .keep_alive
                .then(|| Arc::new(Semaphore::new(settings.max_sockets))),
        }
    }

    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    /// Connection slots not currently leased, if the pool is capped.
    #[must_use]
    pub fn available_slots(&self) -> Option<usize> {
        self.limiter.as_ref().map(|l| l.available_permits())
    }

    /// Wait for a free slot, then send `request` on a pooled or fresh connection.
    ///
    /// The returned [`Lease`] must be kept alive for as long as the upstream
    /// connection is in use (response body or upgraded tunnel).
    pub async fn send(
        &self,
        request: Request<Body>,
    ) -> Result<(Response<Incoming>, Lease), hyper_util::client::legacy::Error> {
        let permit = match &self.limiter {
            // The semaphore is never closed, so acquisition only fails on shutdown races.
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };
        let response = self.client.request(request).await?;
        Ok((response, Lease { _permit: permit }))
    }
}

/// A held connection slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Lease {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Upstream response body that holds its connection slot until dropped.
pub struct LeasedBody {
    inner: Incoming,
    _lease: Lease,
}

impl LeasedBody {
    #[must_use]
    pub const fn new(inner: Incoming, lease: Lease) -> Self {
        Self {
            inner,
            _lease: lease,
        }
    }
}

impl http_body::Body for LeasedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let poll = Pin::new(&mut self.inner).poll_frame(cx);
        if let Poll::Ready(Some(Err(ref e))) = poll {
            tracing::warn!(error = %e, "upstream response body failed mid-stream");
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn build_http_client(settings: &PoolSettings) -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(settings.connect_timeout));
    if settings.keep_alive {
        http.set_keepalive(Some(settings.idle_timeout));
    }

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    let mut builder = Client::builder(TokioExecutor::new());
    builder.pool_timer(TokioTimer::new());
    if settings.keep_alive {
        builder
            .pool_idle_timeout(settings.idle_timeout)
            .pool_max_idle_per_host(settings.max_free_sockets);
    } else {
        builder.pool_max_idle_per_host(0);
    }
    builder.build(https)
}
