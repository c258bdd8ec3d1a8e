//! HTTP request forwarding to the upstream origin.
//!
//! # Responsibilities
//! - Rebuild the inbound request against the upstream origin
//! - Strip conditional-caching and encoding negotiation headers so the
//!   upstream always returns a fresh, uncompressed body
//! - Stream non-HTML responses through untouched
//! - Buffer HTML, rewrite caching headers, run the injector
//! - Synthesize a 502 on upstream failure (the sole synthetic response)

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::http::server::AppState;

/// Largest request body the proxy will buffer for forwarding. Generous:
/// this is a single-developer tool, not a public edge.
const MAX_REQUEST_BODY: usize = 256 * 1024 * 1024;

const CACHE_BUST: &str = "max-age=0, no-cache, must-revalidate, proxy-revalidate";

/// Forward one request to the upstream and relay the response, injecting
/// the reload client into HTML bodies.
pub(crate) async fn forward(state: &AppState, upstream: &Url, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let mut target = upstream.clone();
    target.set_path(parts.uri.path());
    target.set_query(parts.uri.query());

    let mut headers = parts.headers.clone();
    // A fresh, uncompressed body is required for injection; the client
    // sets the host for the upstream authority itself.
    headers.remove(header::IF_MODIFIED_SINCE);
    headers.remove(header::IF_NONE_MATCH);
    headers.remove(header::ACCEPT_ENCODING);
    headers.remove(header::HOST);

    let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let upstream_response = match state
        .client
        .request(parts.method.clone(), target.clone())
        .headers(headers)
        .body(body_bytes)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(url = %target, error = %e, "Failed to send request to upstream");
            return (StatusCode::BAD_GATEWAY, "502 Bad Gateway").into_response();
        }
    };

    let status = upstream_response.status();
    let mut response_headers = upstream_response.headers().clone();

    if !is_html(&response_headers) {
        // Preserve binary integrity: stream straight through.
        let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        return response;
    }

    let body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(url = %target, error = %e, "Failed to read upstream response");
            return (StatusCode::BAD_GATEWAY, "502 Bad Gateway").into_response();
        }
    };

    let html = String::from_utf8_lossy(&body);
    let injected = state
        .injector
        .inject(&html, &state.coordinator.current_epoch());

    // The body length changed and the browser must never cache a page
    // that carries a stale epoch.
    response_headers.remove(header::CONTENT_LENGTH);
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_BUST));

    let mut response = Response::new(Body::from(injected.into_owned()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

fn is_html(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_is_html_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_html(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        assert!(!is_html(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(is_html(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(is_html(&headers));
    }
}
