//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router: poll endpoint plus a catch-all that either
//!   serves static files or proxies to the upstream
//! - Detect WebSocket upgrades on the proxy path and hand them to the
//!   relay
//! - Hold the shared handles (coordinator, injector, upstream client)

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, RawQuery, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{Mode, Settings};
use crate::inject::Injector;
use crate::reload::{Coordinator, PollWait};

/// Path the injected client long-polls for change notifications.
pub const POLL_PATH: &str = "/__dev-refresh-poll";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub injector: Arc<Injector>,
    pub mode: Mode,
    pub client: reqwest::Client,
}

/// HTTP server for the dev proxy / static server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server for the given mode, sharing the coordinator that
    /// the supervisor publishes to.
    pub fn new(settings: &Settings, mode: Mode, coordinator: Arc<Coordinator>) -> Self {
        // Redirects and caching belong to the browser, not the proxy.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();

        let state = AppState {
            coordinator,
            injector: Arc::new(Injector::new(settings.watching())),
            mode,
            client,
        };

        let router = Router::new()
            .route(POLL_PATH, get(poll_handler))
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        Self { router }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Long-poll endpoint. The query string is the bare epoch the client
/// last saw; no query means "tell me the current state right away".
async fn poll_handler(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    match state.coordinator.handle_poll(query.as_deref()) {
        PollWait::Ready(response) => Json(response).into_response(),
        PollWait::Pending(rx) => match rx.await {
            Ok(response) => Json(response).into_response(),
            // Coordinator dropped: the process is going down.
            Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        },
    }
}

/// Everything that is not a poll: static lookup or proxy forward, with
/// WebSocket upgrades peeled off onto the relay in proxy mode.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.mode.clone() {
        Mode::Serve(root) => super::static_files::serve(&state, &root, request).await,
        Mode::Proxy(upstream) => {
            if is_websocket_upgrade(request.headers()) {
                let (mut parts, _body) = request.into_parts();
                match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                    Ok(upgrade) => {
                        super::websocket::handle_upgrade(upgrade, &upstream, &parts.uri)
                    }
                    Err(rejection) => rejection.into_response(),
                }
            } else {
                super::proxy::forward(&state, &upstream, request).await
            }
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
    }
    tracing::info!("Shutdown signal received");
}
