//! Development response headers.
//!
//! Every response is marked uncacheable so a reload always refetches the
//! edited files.

use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use tower_http::set_header::SetResponseHeaderLayer;

/// Cache-Control header value.
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Create layer that adds `Cache-Control: no-cache, no-store, must-revalidate`.
pub(crate) fn cache_control_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE))
}

/// Create layer that adds `Pragma: no-cache` for HTTP/1.0 caches.
pub(crate) fn pragma_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(PRAGMA, HeaderValue::from_static("no-cache"))
}

/// Create layer that adds `Expires: 0`.
pub(crate) fn expires_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(EXPIRES, HeaderValue::from_static("0"))
}
