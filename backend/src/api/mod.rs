//! API handlers.

pub mod channels;
pub mod eq;
pub mod status;

use crate::osc::TransportError;
use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use totalmix_bridge_types::api::ErrorResponse;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn bad_request(error: &str, details: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_details(error, details)),
    )
}

/// The device could not be reached over OSC.
pub(crate) fn device_unreachable(e: TransportError) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse::with_details(
            "Failed to send to TotalMix",
            e.to_string(),
        )),
    )
}

/// A request body axum could not parse, in the same shape as other errors.
pub(crate) fn invalid_body(rejection: JsonRejection) -> ApiError {
    (
        rejection.status(),
        Json(ErrorResponse::with_details(
            "Invalid request body",
            rejection.body_text(),
        )),
    )
}
