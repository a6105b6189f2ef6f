//! TotalMix bridge backend library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, Method};
use axum::{routing::get, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod api;
pub mod config;
pub mod correlation;
pub mod eq;
pub mod openapi;
pub mod osc;
pub mod registry;
pub mod state;

use state::AppState;

/// Create the Axum application router with a given state.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/status", get(api::status::get_status))
        .route("/channels", get(api::channels::list_channels))
        .route(
            "/channels/refresh",
            axum::routing::post(api::channels::refresh_channels),
        )
        .route(
            "/channel/{n}/eq",
            get(api::eq::get_eq).post(api::eq::set_eq),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .nest("/api", api_router)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
