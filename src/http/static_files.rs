//! Static file serving with reload-client injection for HTML.

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::server::AppState;

/// Serve a file from the configured root. HTML files pass through the
/// injector; everything else is sent as-is with its guessed MIME type.
pub(crate) async fn serve(state: &AppState, root: &Path, request: Request<Body>) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(path) = resolve(root, request.uri().path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // Directory requests fall through to the directory's index page.
    let path = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => path.join("index.html"),
        _ => path,
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Static file not found");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let body = if mime.essence_str() == "text/html" {
        let html = String::from_utf8_lossy(&bytes);
        let injected = state
            .injector
            .inject(&html, &state.coordinator.current_epoch());
        Body::from(injected.into_owned())
    } else {
        Body::from(bytes)
    };

    let mut response = Response::new(body);
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    response
}

/// Map a request path onto the root directory, rejecting anything that
/// would escape it.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = Path::new(relative);

    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    Some(root.join(relative))
}
