//! Output channel API handlers.

use axum::{extract::State, Json};
use totalmix_bridge_types::api::{ChannelListResponse, ErrorResponse};
use tracing::info;

use super::{device_unreachable, ApiError};
use crate::state::AppState;

/// List the output channels known to TotalMix.
///
/// Queries the device on first use. A device that does not answer yields an
/// empty list.
#[utoipa::path(
    get,
    path = "/api/channels",
    tag = "channels",
    responses(
        (status = 200, description = "Known output channels", body = ChannelListResponse),
        (status = 502, description = "Device unreachable", body = ErrorResponse)
    )
)]
pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<ChannelListResponse>, ApiError> {
    state
        .registry()
        .ensure_loaded(state.transport())
        .await
        .map_err(device_unreachable)?;

    Ok(Json(ChannelListResponse {
        channels: state.registry().list(),
    }))
}

/// Forget cached channel names and query the device again.
#[utoipa::path(
    post,
    path = "/api/channels/refresh",
    tag = "channels",
    responses(
        (status = 200, description = "Channels after refresh", body = ChannelListResponse),
        (status = 502, description = "Device unreachable", body = ErrorResponse)
    )
)]
pub async fn refresh_channels(
    State(state): State<AppState>,
) -> Result<Json<ChannelListResponse>, ApiError> {
    info!("Refreshing channel names");
    state
        .registry()
        .refresh(state.transport())
        .await
        .map_err(device_unreachable)?;

    Ok(Json(ChannelListResponse {
        channels: state.registry().list(),
    }))
}
