//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let live_reload_enabled = state.live_reload_enabled();
    let mut router = Router::new();

    // WebSocket for live reload
    if live_reload_enabled {
        router = router.route(livedev_assets::LIVE_RELOAD_PATH, get(live_reload::ws_handler));
    }

    // Client script and files under the root
    router = router.merge(static_files::static_router(
        &state.root_dir,
        live_reload_enabled,
    ));

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::cache_control_layer())
                .layer(headers::pragma_layer())
                .layer(headers::expires_layer()),
        )
        .with_state(state)
}
