//! Channel EQ API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use garde::Validate;
use totalmix_bridge_types::{
    api::{EqResponse, EqUpdateRequest, EqUpdateResponse, ErrorResponse},
    FilterSpec,
};
use tracing::{error, info, warn};

use super::{bad_request, device_unreachable, invalid_body, ApiError};
use crate::eq::FilterSet;
use crate::state::AppState;

/// Parse a 1-based channel index from the path.
fn parse_channel(raw: &str) -> Result<u32, ApiError> {
    match raw.parse::<u32>() {
        Ok(index) if index >= 1 => Ok(index),
        _ => Err(bad_request(
            "Invalid channel",
            format!("'{}' is not a channel number", raw),
        )),
    }
}

/// Make sure the channel is one TotalMix reported.
async fn require_channel(state: &AppState, index: u32) -> Result<(), ApiError> {
    state
        .registry()
        .ensure_loaded(state.transport())
        .await
        .map_err(device_unreachable)?;

    state.registry().lookup(index).map(|_| ()).map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::with_details("Invalid channel", e.to_string())),
        )
    })
}

/// Read the active EQ filters of a channel.
///
/// Room EQ bands come first, then PEQ bands. If the device does not report
/// every band before the read deadline, the filters decoded so far are
/// returned with `partial` set.
#[utoipa::path(
    get,
    path = "/api/channel/{n}/eq",
    tag = "eq",
    params(
        ("n" = String, Path, description = "Output channel index (1-based)")
    ),
    responses(
        (status = 200, description = "Current EQ", body = EqResponse),
        (status = 400, description = "Malformed channel index", body = ErrorResponse),
        (status = 404, description = "Unknown channel", body = ErrorResponse),
        (status = 500, description = "Read did not finish", body = ErrorResponse),
        (status = 502, description = "Device unreachable", body = ErrorResponse)
    )
)]
pub async fn get_eq(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<Json<EqResponse>, ApiError> {
    let channel = parse_channel(&n)?;
    require_channel(&state, channel).await?;

    let task_state = state.clone();
    let mut read = tokio::spawn(async move { task_state.read_eq(channel).await });

    let decoded = match tokio::time::timeout(state.config().facade_timeout(), &mut read).await {
        Ok(Ok(Ok(decoded))) => decoded,
        Ok(Ok(Err(e))) => return Err(device_unreachable(e)),
        Ok(Err(e)) => {
            error!("EQ read task for channel {} failed: {}", channel, e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details("EQ read failed", e.to_string())),
            ));
        }
        Err(_) => {
            read.abort();
            error!("EQ read for channel {} did not finish in time", channel);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("EQ read timed out")),
            ));
        }
    };

    if decoded.partial {
        warn!(
            "Channel {} EQ incomplete, returning {} filters",
            channel,
            decoded.filters.len()
        );
    }

    Ok(Json(EqResponse {
        filters: decoded.filters.iter().map(FilterSpec::from).collect(),
        partial: decoded.partial,
    }))
}

/// Replace the EQ of a channel.
///
/// The first nine filters go to Room EQ, the rest to PEQ. Bands not covered
/// by the list are switched off. The whole list is validated before anything
/// is sent to the device.
#[utoipa::path(
    post,
    path = "/api/channel/{n}/eq",
    tag = "eq",
    params(
        ("n" = String, Path, description = "Output channel index (1-based)")
    ),
    request_body = EqUpdateRequest,
    responses(
        (status = 200, description = "EQ written", body = EqUpdateResponse),
        (status = 400, description = "Invalid channel index, body or filter list", body = ErrorResponse),
        (status = 404, description = "Unknown channel", body = ErrorResponse),
        (status = 415, description = "Body is not JSON", body = ErrorResponse),
        (status = 422, description = "Body does not match the request schema", body = ErrorResponse),
        (status = 502, description = "Device unreachable", body = ErrorResponse)
    )
)]
pub async fn set_eq(
    State(state): State<AppState>,
    Path(n): Path<String>,
    body: Result<Json<EqUpdateRequest>, JsonRejection>,
) -> Result<Json<EqUpdateResponse>, ApiError> {
    let channel = parse_channel(&n)?;
    let Json(req) = body.map_err(invalid_body)?;

    if let Err(report) = req.validate() {
        return Err(bad_request("Invalid filter list", report.to_string()));
    }
    let filters = FilterSet::try_from(req.filters.as_slice())
        .map_err(|e| bad_request("Invalid filter list", e.to_string()))?;

    require_channel(&state, channel).await?;

    info!("Setting {} filters on channel {}", filters.len(), channel);
    let summary = state
        .write_eq(channel, &filters)
        .await
        .map_err(device_unreachable)?;

    Ok(Json(EqUpdateResponse {
        status: "ok".to_string(),
        room_eq: summary.room_eq,
        peq: summary.peq,
    }))
}
