//! Conversion between engineering units and TotalMix normalized values.
//!
//! TotalMix exposes every EQ control over OSC as a float in `0.0..=1.0`.
//! Frequency is logarithmic, gain and Q are linear.

use totalmix_bridge_types::eq::{FREQ_MAX_HZ, FREQ_MIN_HZ, GAIN_MAX_DB, GAIN_MIN_DB, Q_MAX, Q_MIN};
use totalmix_bridge_types::FilterType;

/// Type code for a bell band.
pub const TYPE_BELL: f32 = 0.0;
/// Type code for a low shelf band.
pub const TYPE_LOW_SHELF: f32 = 0.333_333;
/// Type code for a high shelf band. Distinct from the low shelf code so a
/// read-back keeps the side.
pub const TYPE_HIGH_SHELF: f32 = 0.666_667;

pub const ON: f32 = 1.0;
pub const OFF: f32 = 0.0;

/// Round to the device's frequency resolution (1 Hz).
pub fn quantize_freq(hz: f64) -> f64 {
    hz.round()
}

/// Round to the device's gain resolution (0.1 dB).
pub fn quantize_gain(db: f64) -> f64 {
    (db * 10.0).round() / 10.0
}

/// Round to the device's Q resolution (0.01).
pub fn quantize_q(q: f64) -> f64 {
    (q * 100.0).round() / 100.0
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

pub fn freq_to_normalized(hz: f64) -> f32 {
    let (lo, hi) = (FREQ_MIN_HZ.log10(), FREQ_MAX_HZ.log10());
    clamp_unit((hz.log10() - lo) / (hi - lo)) as f32
}

pub fn normalized_to_freq(v: f32) -> f64 {
    let (lo, hi) = (FREQ_MIN_HZ.log10(), FREQ_MAX_HZ.log10());
    quantize_freq(10f64.powf(lo + clamp_unit(v as f64) * (hi - lo)))
}

pub fn gain_to_normalized(db: f64) -> f32 {
    clamp_unit((db - GAIN_MIN_DB) / (GAIN_MAX_DB - GAIN_MIN_DB)) as f32
}

pub fn normalized_to_gain(v: f32) -> f64 {
    quantize_gain(GAIN_MIN_DB + clamp_unit(v as f64) * (GAIN_MAX_DB - GAIN_MIN_DB))
}

pub fn q_to_normalized(q: f64) -> f32 {
    clamp_unit((q - Q_MIN) / (Q_MAX - Q_MIN)) as f32
}

pub fn normalized_to_q(v: f32) -> f64 {
    quantize_q(Q_MIN + clamp_unit(v as f64) * (Q_MAX - Q_MIN))
}

pub fn type_to_code(kind: FilterType) -> f32 {
    match kind {
        FilterType::Peak => TYPE_BELL,
        FilterType::LowShelf => TYPE_LOW_SHELF,
        FilterType::HighShelf => TYPE_HIGH_SHELF,
    }
}

/// Decode a type code by nearest match.
pub fn code_to_type(v: f32) -> FilterType {
    if v < 1.0 / 6.0 {
        FilterType::Peak
    } else if v < 0.5 {
        FilterType::LowShelf
    } else {
        FilterType::HighShelf
    }
}

pub fn is_on(v: f32) -> bool {
    v >= 0.5
}
