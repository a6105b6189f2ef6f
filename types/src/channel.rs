//! Output channel types.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A named hardware output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Channel {
    /// 1-based channel index as shown in TotalMix
    pub index: u32,
    /// Channel name reported by the device
    pub name: String,
}
