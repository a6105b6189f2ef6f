//! Static OSC address table for the TotalMix EQ surface.
//!
//! Every address the bridge sends or understands is described by a
//! [`DeviceAddress`] variant. Channel-relative EQ parameter names are looked up
//! in a table built once per process; nothing else in the crate matches on raw
//! address strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// One of the two EQ stages of an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// 9-band Room EQ
    RoomEq,
    /// 3-band parametric EQ
    ParametricEq,
}

impl Stage {
    /// Stages in filter-list order.
    pub const ALL: [Stage; 2] = [Stage::RoomEq, Stage::ParametricEq];

    /// Number of band slots in this stage.
    pub fn slot_count(self) -> u8 {
        match self {
            Stage::RoomEq => 9,
            Stage::ParametricEq => 3,
        }
    }

    /// Position of this stage's first slot in a flat filter list.
    pub fn first_filter_index(self) -> usize {
        match self {
            Stage::RoomEq => 0,
            Stage::ParametricEq => Stage::RoomEq.slot_count() as usize,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Stage::RoomEq => "req",
            Stage::ParametricEq => "eq",
        }
    }
}

/// Per-slot band parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    BandEnable,
    Type,
    Freq,
    Gain,
    Q,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::BandEnable,
        Param::Type,
        Param::Freq,
        Param::Gain,
        Param::Q,
    ];

    fn name(self) -> &'static str {
        match self {
            Param::BandEnable => "BandEnable",
            Param::Type => "Type",
            Param::Freq => "Freq",
            Param::Gain => "Gain",
            Param::Q => "Q",
        }
    }
}

/// A channel-relative EQ parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKey {
    /// Stage on/off switch
    StageEnable(Stage),
    /// One parameter of one band slot (slots are 1-based)
    Slot { stage: Stage, slot: u8, param: Param },
}

impl ParamKey {
    /// Every EQ parameter of a channel: both stage switches and all slot
    /// parameters, in stage and slot order.
    pub fn all() -> &'static [ParamKey] {
        &ALL_KEYS
    }

    /// Address relative to the channel prefix, e.g. `reqGain3`.
    fn relative_address(&self) -> String {
        match self {
            ParamKey::StageEnable(stage) => format!("{}Enable", stage.prefix()),
            ParamKey::Slot { stage, slot, param } => {
                format!("{}{}{}", stage.prefix(), param.name(), slot)
            }
        }
    }
}

static ALL_KEYS: LazyLock<Vec<ParamKey>> = LazyLock::new(|| {
    let mut keys = Vec::new();
    for stage in Stage::ALL {
        keys.push(ParamKey::StageEnable(stage));
        for slot in 1..=stage.slot_count() {
            for param in Param::ALL {
                keys.push(ParamKey::Slot { stage, slot, param });
            }
        }
    }
    keys
});

static PARAM_TABLE: LazyLock<HashMap<String, ParamKey>> = LazyLock::new(|| {
    ALL_KEYS
        .iter()
        .map(|key| (key.relative_address(), *key))
        .collect()
});

const CHANNEL_PREFIX: &str = "/channel/";
const NAME_QUERY: &str = "/channels/refresh";
const TRACK_NAME: &str = "trackname";
const REFRESH: &str = "refresh";

/// A decoded device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceAddress {
    /// Keep-alive sent by TotalMix (`/`)
    Heartbeat,
    /// Request for all channel names
    NameQuery,
    /// Name of one output channel
    TrackName { channel: u32 },
    /// Request for the full EQ state of one channel
    ChannelRefresh { channel: u32 },
    /// One EQ parameter of one channel
    Param { channel: u32, key: ParamKey },
}

impl DeviceAddress {
    /// Decode an OSC address string. Returns `None` for addresses the bridge
    /// does not use.
    pub fn parse(address: &str) -> Option<Self> {
        if address == "/" {
            return Some(DeviceAddress::Heartbeat);
        }
        if address == NAME_QUERY {
            return Some(DeviceAddress::NameQuery);
        }

        let rest = address.strip_prefix(CHANNEL_PREFIX)?;
        let (channel, name) = rest.split_once('/')?;
        let channel: u32 = channel.parse().ok().filter(|c| *c >= 1)?;

        match name {
            TRACK_NAME => Some(DeviceAddress::TrackName { channel }),
            REFRESH => Some(DeviceAddress::ChannelRefresh { channel }),
            _ => PARAM_TABLE
                .get(name)
                .map(|key| DeviceAddress::Param { channel, key: *key }),
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAddress::Heartbeat => f.write_str("/"),
            DeviceAddress::NameQuery => f.write_str(NAME_QUERY),
            DeviceAddress::TrackName { channel } => {
                write!(f, "{}{}/{}", CHANNEL_PREFIX, channel, TRACK_NAME)
            }
            DeviceAddress::ChannelRefresh { channel } => {
                write!(f, "{}{}/{}", CHANNEL_PREFIX, channel, REFRESH)
            }
            DeviceAddress::Param { channel, key } => {
                write!(f, "{}{}/{}", CHANNEL_PREFIX, channel, key.relative_address())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_covers_every_slot_parameter() {
        // 2 stage switches + (9 + 3) slots * 5 parameters
        assert_eq!(ParamKey::all().len(), 62);
        assert_eq!(PARAM_TABLE.len(), 62);

        let distinct: HashSet<_> = ParamKey::all().iter().collect();
        assert_eq!(distinct.len(), 62);
    }

    #[test]
    fn test_addresses_are_bijective() {
        let mut seen = HashSet::new();
        for key in ParamKey::all() {
            let address = DeviceAddress::Param {
                channel: 7,
                key: *key,
            };
            let text = address.to_string();
            assert!(seen.insert(text.clone()), "duplicate address {}", text);
            assert_eq!(DeviceAddress::parse(&text), Some(address));
        }
    }

    #[test]
    fn test_parse_known_addresses() {
        assert_eq!(
            DeviceAddress::parse("/channel/3/reqGain9"),
            Some(DeviceAddress::Param {
                channel: 3,
                key: ParamKey::Slot {
                    stage: Stage::RoomEq,
                    slot: 9,
                    param: Param::Gain
                }
            })
        );
        assert_eq!(
            DeviceAddress::parse("/channel/12/eqEnable"),
            Some(DeviceAddress::Param {
                channel: 12,
                key: ParamKey::StageEnable(Stage::ParametricEq)
            })
        );
        assert_eq!(
            DeviceAddress::parse("/channel/2/trackname"),
            Some(DeviceAddress::TrackName { channel: 2 })
        );
        assert_eq!(DeviceAddress::parse("/"), Some(DeviceAddress::Heartbeat));
    }

    #[test]
    fn test_parse_rejects_unknown_addresses() {
        assert_eq!(DeviceAddress::parse("/channel/3/reqGain10"), None);
        assert_eq!(DeviceAddress::parse("/channel/3/eqGain4"), None);
        assert_eq!(DeviceAddress::parse("/channel/0/reqGain1"), None);
        assert_eq!(DeviceAddress::parse("/channel/x/reqGain1"), None);
        assert_eq!(DeviceAddress::parse("/1/busOutput"), None);
        assert_eq!(DeviceAddress::parse(""), None);
    }

    #[test]
    fn test_stage_layout() {
        assert_eq!(Stage::RoomEq.first_filter_index(), 0);
        assert_eq!(Stage::ParametricEq.first_filter_index(), 9);
        assert_eq!(
            DeviceAddress::ChannelRefresh { channel: 4 }.to_string(),
            "/channel/4/refresh"
        );
        assert_eq!(DeviceAddress::NameQuery.to_string(), "/channels/refresh");
    }
}
