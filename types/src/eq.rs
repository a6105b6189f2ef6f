//! Equalizer filter wire types.

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Maximum number of filters on one channel (9 Room EQ bands + 3 PEQ bands).
pub const MAX_FILTERS: usize = 12;

/// Lowest frequency the device EQ accepts, in Hz.
pub const FREQ_MIN_HZ: f64 = 20.0;
/// Highest frequency the device EQ accepts, in Hz.
pub const FREQ_MAX_HZ: f64 = 20000.0;
/// Lowest band gain, in dB.
pub const GAIN_MIN_DB: f64 = -20.0;
/// Highest band gain, in dB.
pub const GAIN_MAX_DB: f64 = 20.0;
/// Narrowest usable Q.
pub const Q_MIN: f64 = 0.4;
/// Widest usable Q.
pub const Q_MAX: f64 = 9.9;

/// Filter shape in the public vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum FilterType {
    /// Bell / peaking filter
    #[serde(rename = "PK")]
    Peak,
    /// Low shelf
    #[serde(rename = "LSQ")]
    LowShelf,
    /// High shelf
    #[serde(rename = "HSQ")]
    HighShelf,
}

impl FilterType {
    /// Parse a filter type code.
    ///
    /// Matching is case-insensitive. The shelf aliases `LS`/`LSC` and
    /// `HS`/`HSC` used by some EQ tools are accepted; pass and cut filters
    /// are not, since the device has no such stage.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "PK" => Some(Self::Peak),
            "LSQ" | "LS" | "LSC" => Some(Self::LowShelf),
            "HSQ" | "HS" | "HSC" => Some(Self::HighShelf),
            _ => None,
        }
    }

    /// Canonical code for this filter type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Peak => "PK",
            Self::LowShelf => "LSQ",
            Self::HighShelf => "HSQ",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_q() -> f64 {
    1.0
}

/// A single EQ filter as exchanged with web clients.
///
/// The type is kept as a string so that unsupported codes can be reported
/// with a descriptive validation error instead of a generic parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(garde::Validate))]
pub struct FilterSpec {
    /// Filter type: `PK`, `LSQ` or `HSQ`
    #[serde(rename = "type")]
    #[cfg_attr(feature = "validation", garde(custom(validate_filter_type)))]
    pub filter_type: String,
    /// Center or corner frequency in Hz
    #[cfg_attr(
        feature = "validation",
        garde(range(min = FREQ_MIN_HZ, max = FREQ_MAX_HZ))
    )]
    pub freq: f64,
    /// Gain in dB
    #[cfg_attr(
        feature = "validation",
        garde(range(min = GAIN_MIN_DB, max = GAIN_MAX_DB))
    )]
    pub gain: f64,
    /// Quality factor
    #[serde(default = "default_q")]
    #[cfg_attr(feature = "validation", garde(range(min = Q_MIN, max = Q_MAX)))]
    pub q: f64,
}

impl FilterSpec {
    pub fn new(filter_type: FilterType, freq: f64, gain: f64, q: f64) -> Self {
        Self {
            filter_type: filter_type.as_str().to_string(),
            freq,
            gain,
            q,
        }
    }
}

#[cfg(feature = "validation")]
#[allow(clippy::ptr_arg)]
fn validate_filter_type(value: &String, _ctx: &()) -> garde::Result {
    match FilterType::parse(value) {
        Some(_) => Ok(()),
        None => Err(garde::Error::new(format!(
            "unsupported filter type '{}' (expected PK, LSQ or HSQ)",
            value
        ))),
    }
}
