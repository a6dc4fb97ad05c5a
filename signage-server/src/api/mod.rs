pub mod analytics_api;
pub mod devices_api;
pub mod media_api;
pub mod playlist_api;
pub mod system_api;

#[cfg(test)]
mod api_test;

use crate::AppState;
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Media library
        .route("/media", get(media_api::list_media))
        .route("/media/detailed", get(media_api::list_media_detailed))
        .route(
            "/media/:id",
            get(media_api::get_media).delete(media_api::delete_media),
        )
        .route("/media/:id/schedule", put(media_api::update_schedule))
        .route("/media/:id/toggle", put(media_api::toggle_media))
        // Assignments
        .route("/assign-content", post(devices_api::assign_content))
        .route("/assign-all-devices", post(devices_api::assign_all_devices))
        .route(
            "/device-content/:id",
            put(devices_api::update_device_content),
        )
        .route("/remove-content/:id", delete(devices_api::remove_content))
        .route("/device/reorder-content", put(devices_api::reorder_content))
        // Devices
        .route("/devices", get(devices_api::list_devices))
        .route(
            "/device/:device_id/content",
            get(devices_api::get_device_content),
        )
        .route("/device/:device_id", put(devices_api::update_device))
        // Device-facing
        .route("/playlist/:device_id", get(playlist_api::get_playlist))
        .route("/analytics", post(analytics_api::record_playback))
        // System
        .route("/system/last-update", get(system_api::last_update))
        .route("/system/status", get(system_api::status))
}

/// Full application router without the admin UI fallback.
pub fn app(state: AppState) -> Router {
    let upload_dir = state.config.storage.upload_dir.clone();
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .nest("/api", routes())
        .route(
            "/upload",
            post(media_api::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Caller address, preferring the first `X-Forwarded-For` hop.
pub(crate) fn client_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(addr) => Some(addr.to_string()),
        None => connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}
