//! API request and response types.

use crate::channel::Channel;
use crate::eq::FilterSpec;
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Status API Types
// ============================================================================

/// Address of the TotalMix OSC endpoint the bridge talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
}

/// Bridge and device liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StatusResponse {
    /// Always `"ok"` while the bridge is serving requests
    pub status: String,
    /// Bridge version
    pub version: String,
    /// HTTP port the bridge listens on
    pub port: u16,
    /// Where OSC commands are sent
    pub device: DeviceEndpoint,
    /// UDP port the bridge receives OSC replies on
    pub listen_port: u16,
    /// Whether any OSC message has ever been received from the device
    pub device_seen: bool,
    /// Milliseconds since the last OSC message from the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_ms_ago: Option<u64>,
    /// Number of OSC messages received since startup
    pub messages_received: u64,
    /// Number of datagrams that could not be decoded
    pub packets_dropped: u64,
}

// ============================================================================
// Channel API Types
// ============================================================================

/// Response containing the known output channels, ordered by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ChannelListResponse {
    pub channels: Vec<Channel>,
}

// ============================================================================
// EQ API Types
// ============================================================================

/// EQ settings read back from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EqResponse {
    /// Active filters, Room EQ bands first, then PEQ bands
    pub filters: Vec<FilterSpec>,
    /// Set when the device did not report every band before the read deadline
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

/// Request to replace the EQ settings of a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(garde::Validate))]
pub struct EqUpdateRequest {
    /// Up to 12 filters; the first 9 go to Room EQ, the rest to PEQ
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(length(max = crate::eq::MAX_FILTERS), dive))]
    pub filters: Vec<FilterSpec>,
}

/// Result of an EQ write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EqUpdateResponse {
    pub status: String,
    /// Number of bands written to Room EQ
    pub room_eq: usize,
    /// Number of bands written to PEQ
    pub peq: usize,
}

// ============================================================================
// Common Response Types
// ============================================================================

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
