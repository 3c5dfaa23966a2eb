//! Static file serving.
//!
//! Files under the root directory are served by [`ServeDir`], which reads
//! them on every request so edits show up on the next load. When live reload
//! is enabled, full HTML responses pass through [`inject_script`] on the way
//! out and pick up the client script tag.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Largest HTML document that gets the client script.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

/// Create router for files under the root and the client script.
pub(crate) fn static_router(root_dir: &Path, live_reload_enabled: bool) -> Router<Arc<AppState>> {
    let router = Router::new().fallback_service(ServeDir::new(root_dir));
    if !live_reload_enabled {
        return router;
    }

    router
        .layer(middleware::from_fn(inject_script))
        .route(livedev_assets::CLIENT_SCRIPT_PATH, get(serve_client_script))
}

/// Serve the live reload client script.
async fn serve_client_script() -> Response {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        livedev_assets::client_script(),
    )
        .into_response()
}

/// Add the client script tag to complete HTML responses.
///
/// HEAD, partial and non-HTML responses pass through untouched, as do
/// documents that are not valid UTF-8.
async fn inject_script(request: Request, next: Next) -> Response {
    let is_get = request.method() == Method::GET;
    let response = next.run(request).await;
    if !is_get || response.status() != StatusCode::OK || !is_html(response.headers()) {
        return response;
    }
    if content_length(response.headers()).is_some_and(|len| len > MAX_INJECT_BYTES) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = match String::from_utf8(bytes.to_vec()) {
        Ok(html) => {
            // Length and byte ranges described the file, not the new body
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.remove(header::ACCEPT_RANGES);
            Body::from(livedev_assets::inject_client_script(&html))
        }
        Err(_) => Body::from(bytes),
    };
    Response::from_parts(parts, body)
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
