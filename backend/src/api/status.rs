//! Bridge status API.

use axum::{extract::State, Json};
use totalmix_bridge_types::api::{DeviceEndpoint, StatusResponse};

use crate::state::AppState;

/// Report bridge configuration and device liveness.
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "System",
    responses(
        (status = 200, description = "Bridge status", body = StatusResponse)
    )
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = state.config();
    let stats = state.transport().stats();
    let device = state.transport().device_addr();

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: config.port,
        device: DeviceEndpoint {
            host: config.device_host.clone(),
            port: device.port(),
        },
        listen_port: state.transport().local_addr().port(),
        device_seen: stats.last_message_age.is_some(),
        last_message_ms_ago: stats
            .last_message_age
            .map(|age| age.as_millis().min(u64::MAX as u128) as u64),
        messages_received: stats.messages_received,
        packets_dropped: stats.packets_dropped,
    })
}
