//! OpenAPI documentation configuration.

use totalmix_bridge_types::api::{
    ChannelListResponse, DeviceEndpoint, EqResponse, EqUpdateRequest, EqUpdateResponse,
    ErrorResponse, StatusResponse,
};
use totalmix_bridge_types::{Channel, FilterSpec, FilterType};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::status::get_status,
        crate::api::channels::list_channels,
        crate::api::channels::refresh_channels,
        crate::api::eq::get_eq,
        crate::api::eq::set_eq,
    ),
    components(
        schemas(
            StatusResponse,
            DeviceEndpoint,
            Channel,
            ChannelListResponse,
            FilterSpec,
            FilterType,
            EqResponse,
            EqUpdateRequest,
            EqUpdateResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "channels", description = "TotalMix output channel endpoints"),
        (name = "eq", description = "Room EQ and parametric EQ endpoints"),
        (name = "System", description = "System information endpoints")
    ),
    info(
        title = "TotalMix FX EQ Bridge API",
        version = "1.0.0",
        description = "REST API for reading and writing TotalMix FX output channel equalizers over OSC",
        license(
            name = "MIT OR Apache-2.0"
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/api/status",
            "/api/channels",
            "/api/channels/refresh",
            "/api/channel/{n}/eq",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
    }
}
