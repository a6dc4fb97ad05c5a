use crate::error::ApiResult;
use crate::services::playlist_service::{self, PlaylistEntry, Poller};
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistQuery {
    pub app_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistResponse {
    pub device_id: String,
    pub server_url: String,
    pub updated_at: DateTime<Utc>,
    /// Content version the playlist was resolved against.
    pub version: u64,
    pub playlist: Vec<PlaylistEntry>,
}

pub async fn get_playlist(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<PlaylistQuery>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> ApiResult<Json<PlaylistResponse>> {
    let now = Utc::now();
    let as_of = now.with_timezone(&state.timezone).naive_local();
    let address = super::client_address(&headers, connect_info.as_ref());

    // Read before resolving so a concurrent change shows up as a newer
    // version on the next poll.
    let version = state.store.version().current();

    let poller = Poller {
        device_id: &device_id,
        address: address.as_deref(),
        app_version: query.app_version.as_deref(),
        checked_in_at: now.naive_utc(),
    };
    let playlist = playlist_service::checkin_and_resolve(
        &state.store,
        poller,
        as_of,
        state.playlist_settings(),
    )?;

    Ok(Json(PlaylistResponse {
        device_id,
        server_url: state.base_url.to_string(),
        updated_at: now,
        version,
        playlist,
    }))
}
