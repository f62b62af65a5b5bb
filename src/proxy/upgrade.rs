//! Protocol upgrade (WebSocket and friends) tunnelling.
//!
//! An upgrade request goes through the normal forwarding path, so the
//! handshake is subject to the request timeout. Once the upstream answers
//! `101 Switching Protocols`, both upgraded connections are spliced
//! together in a detached task and bytes flow in both directions with no
//! deadline until either side closes.

use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::HeaderMap;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

use super::failure::RequestLabel;
use super::pool::Lease;

/// `Connection: upgrade` plus an `Upgrade` header.
#[must_use]
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE)
        && headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Splice the client and upstream connections once both upgrades complete.
///
/// `lease` keeps the upstream connection slot occupied for the tunnel's lifetime.
pub fn spawn_tunnel(client: OnUpgrade, upstream: OnUpgrade, lease: Lease, request: RequestLabel) {
    tokio::spawn(async move {
        let _lease = lease;
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    error = %e,
                    "protocol upgrade failed"
                );
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((to_upstream, to_client)) => tracing::debug!(
                path = %request.path,
                to_upstream,
                to_client,
                "upgraded connection closed"
            ),
            Err(e) => tracing::debug!(
                path = %request.path,
                error = %e,
                "upgraded connection ended with error"
            ),
        }
    });
}
