//! WebSocket upgrade forwarding.
//!
//! # Data Flow
//! ```text
//! Browser ── upgrade ──→ server ── dial (ws/wss) ──→ upstream
//!          ←──────────── relay pair (relay.rs) ────────────→
//! ```
//!
//! The upstream connection targets the same path and query on the
//! configured origin, with the scheme mapped http→ws and https→wss.

use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::http::relay;

/// Complete the downstream handshake and wire both sockets into a relay
/// pair. The upstream dial happens inside the relay so that frames from
/// the browser arriving first are buffered rather than lost.
pub(crate) fn handle_upgrade(ws: WebSocketUpgrade, upstream: &Url, uri: &Uri) -> Response {
    let target = match ws_target(upstream, uri) {
        Some(target) => target,
        None => {
            tracing::error!(upstream = %upstream, "Cannot derive WebSocket target from upstream origin");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    ws.on_upgrade(move |socket| relay::run(socket, target))
}

/// Map the upstream origin and request URI to a ws/wss URL.
fn ws_target(upstream: &Url, uri: &Uri) -> Option<Url> {
    let mut target = upstream.clone();
    let scheme = match upstream.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return None,
    };
    target.set_scheme(scheme).ok()?;
    target.set_path(uri.path());
    target.set_query(uri.query());
    Some(target)
}
