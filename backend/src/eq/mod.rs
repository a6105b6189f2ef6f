//! EQ band mapping.
//!
//! Translates between the flat, ordered filter list used by web clients and
//! the two EQ stages of a TotalMix output channel. The first nine filters go
//! to Room EQ slots 1-9, the next three to PEQ slots 1-3.

pub mod scale;

use crate::osc::{Param, ParamKey, Stage};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use totalmix_bridge_types::eq::{FREQ_MAX_HZ, FREQ_MIN_HZ, GAIN_MAX_DB, GAIN_MIN_DB, Q_MAX, Q_MIN};
use totalmix_bridge_types::{FilterSpec, FilterType, MAX_FILTERS};

/// Filter list validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Too many filters: {count} (maximum is {max})")]
    TooManyFilters { count: usize, max: usize },
    #[error("Filter {index}: unsupported filter type '{code}' (expected PK, LSQ or HSQ)")]
    UnsupportedType { index: usize, code: String },
    #[error("Filter {index}: {field} {value} is outside {min}..={max}")]
    OutOfRange {
        index: usize,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ValidationError {
    fn at(self, position: usize) -> Self {
        match self {
            ValidationError::UnsupportedType { code, .. } => ValidationError::UnsupportedType {
                index: position,
                code,
            },
            ValidationError::OutOfRange {
                field,
                value,
                min,
                max,
                ..
            } => ValidationError::OutOfRange {
                index: position,
                field,
                value,
                min,
                max,
            },
            other => other,
        }
    }
}

/// A validated filter at device resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    pub kind: FilterType,
    pub freq_hz: f64,
    pub gain_db: f64,
    pub q: f64,
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    // NaN fails the containment check as well
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            index: 0,
            field,
            value,
            min,
            max,
        })
    }
}

impl Filter {
    /// Validate ranges and round values to device resolution.
    pub fn new(kind: FilterType, freq_hz: f64, gain_db: f64, q: f64) -> Result<Self, ValidationError> {
        check_range("freq", freq_hz, FREQ_MIN_HZ, FREQ_MAX_HZ)?;
        check_range("gain", gain_db, GAIN_MIN_DB, GAIN_MAX_DB)?;
        check_range("q", q, Q_MIN, Q_MAX)?;
        Ok(Self {
            kind,
            freq_hz: scale::quantize_freq(freq_hz),
            gain_db: scale::quantize_gain(gain_db),
            q: scale::quantize_q(q),
        })
    }
}

impl TryFrom<&FilterSpec> for Filter {
    type Error = ValidationError;

    fn try_from(spec: &FilterSpec) -> Result<Self, Self::Error> {
        let kind =
            FilterType::parse(&spec.filter_type).ok_or_else(|| ValidationError::UnsupportedType {
                index: 0,
                code: spec.filter_type.clone(),
            })?;
        Filter::new(kind, spec.freq, spec.gain, spec.q)
    }
}

impl From<&Filter> for FilterSpec {
    fn from(filter: &Filter) -> Self {
        FilterSpec::new(filter.kind, filter.freq_hz, filter.gain_db, filter.q)
    }
}

/// Ordered list of at most [`MAX_FILTERS`] filters for one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet(Vec<Filter>);

impl FilterSet {
    pub fn new(filters: Vec<Filter>) -> Result<Self, ValidationError> {
        if filters.len() > MAX_FILTERS {
            return Err(ValidationError::TooManyFilters {
                count: filters.len(),
                max: MAX_FILTERS,
            });
        }
        Ok(Self(filters))
    }

    pub fn filters(&self) -> &[Filter] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of filters that land in the given stage.
    pub fn stage_len(&self, stage: Stage) -> usize {
        self.0
            .len()
            .saturating_sub(stage.first_filter_index())
            .min(stage.slot_count() as usize)
    }

    fn at(&self, stage: Stage, slot: u8) -> Option<&Filter> {
        self.0
            .get(stage.first_filter_index() + slot as usize - 1)
    }
}

impl TryFrom<&[FilterSpec]> for FilterSet {
    type Error = ValidationError;

    /// Checks the count before looking at any individual filter.
    fn try_from(specs: &[FilterSpec]) -> Result<Self, Self::Error> {
        if specs.len() > MAX_FILTERS {
            return Err(ValidationError::TooManyFilters {
                count: specs.len(),
                max: MAX_FILTERS,
            });
        }
        let filters = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| Filter::try_from(spec).map_err(|e| e.at(i)))
            .collect::<Result<Vec<_>, _>>()?;
        FilterSet::new(filters)
    }
}

/// One parameter value to send to the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamWrite {
    pub key: ParamKey,
    pub value: f32,
}

fn slot_key(stage: Stage, slot: u8, param: Param) -> ParamKey {
    ParamKey::Slot { stage, slot, param }
}

/// Build the full set of parameter writes for a filter set.
///
/// Every slot of both stages is written: covered slots get all five
/// parameters, uncovered slots are switched off. Each stage is switched on
/// exactly when it holds at least one filter. The result fully determines the
/// channel's EQ, so writing a shorter list removes previously set bands.
pub fn encode(set: &FilterSet) -> Vec<ParamWrite> {
    let mut writes = Vec::new();
    for stage in Stage::ALL {
        for slot in 1..=stage.slot_count() {
            match set.at(stage, slot) {
                Some(filter) => {
                    writes.extend([
                        ParamWrite {
                            key: slot_key(stage, slot, Param::BandEnable),
                            value: scale::ON,
                        },
                        ParamWrite {
                            key: slot_key(stage, slot, Param::Type),
                            value: scale::type_to_code(filter.kind),
                        },
                        ParamWrite {
                            key: slot_key(stage, slot, Param::Freq),
                            value: scale::freq_to_normalized(filter.freq_hz),
                        },
                        ParamWrite {
                            key: slot_key(stage, slot, Param::Gain),
                            value: scale::gain_to_normalized(filter.gain_db),
                        },
                        ParamWrite {
                            key: slot_key(stage, slot, Param::Q),
                            value: scale::q_to_normalized(filter.q),
                        },
                    ]);
                }
                None => writes.push(ParamWrite {
                    key: slot_key(stage, slot, Param::BandEnable),
                    value: scale::OFF,
                }),
            }
        }
        writes.push(ParamWrite {
            key: ParamKey::StageEnable(stage),
            value: if set.stage_len(stage) > 0 {
                scale::ON
            } else {
                scale::OFF
            },
        });
    }
    writes
}

/// Parameters that make up a complete read of one channel.
pub fn read_set() -> HashSet<ParamKey> {
    ParamKey::all().iter().copied().collect()
}

/// Decoded state of one band slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotState {
    Disabled,
    Enabled(Filter),
    /// Some parameter needed to decode the slot was never reported
    Unknown,
}

/// Decode one slot from collected device values.
pub fn decode_slot(values: &HashMap<ParamKey, f32>, stage: Stage, slot: u8) -> SlotState {
    let get = |param| values.get(&slot_key(stage, slot, param)).copied();

    match get(Param::BandEnable) {
        None => SlotState::Unknown,
        Some(v) if !scale::is_on(v) => SlotState::Disabled,
        Some(_) => match (
            get(Param::Type),
            get(Param::Freq),
            get(Param::Gain),
            get(Param::Q),
        ) {
            (Some(kind), Some(freq), Some(gain), Some(q)) => SlotState::Enabled(Filter {
                kind: scale::code_to_type(kind),
                freq_hz: scale::normalized_to_freq(freq),
                gain_db: scale::normalized_to_gain(gain),
                q: scale::normalized_to_q(q),
            }),
            _ => SlotState::Unknown,
        },
    }
}

/// Filters read back from a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedEq {
    pub filters: Vec<Filter>,
    pub partial: bool,
}

/// Rebuild the ordered filter list from collected device values.
///
/// Only enabled slots of enabled stages are returned, Room EQ first. Slots
/// that cannot be decoded are left out and mark the result partial;
/// `incomplete` marks it partial regardless.
pub fn decode(values: &HashMap<ParamKey, f32>, incomplete: bool) -> DecodedEq {
    let mut decoded = DecodedEq {
        filters: Vec::new(),
        partial: incomplete,
    };

    for stage in Stage::ALL {
        match values.get(&ParamKey::StageEnable(stage)) {
            None => {
                decoded.partial = true;
                continue;
            }
            Some(v) if !scale::is_on(*v) => continue,
            Some(_) => {}
        }

        for slot in 1..=stage.slot_count() {
            match decode_slot(values, stage, slot) {
                SlotState::Enabled(filter) => decoded.filters.push(filter),
                SlotState::Disabled => {}
                SlotState::Unknown => decoded.partial = true,
            }
        }
    }
    decoded
}
