//! Simulated TotalMix FX device for integration tests.
//!
//! Listens on a loopback UDP port, stores every EQ value written to it, and
//! answers name queries and channel refreshes the way TotalMix does.

#![allow(dead_code)]

use parking_lot::Mutex;
use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use totalmix_bridge::config::Config;
use totalmix_bridge::osc::{DeviceAddress, Param, ParamKey};
use totalmix_bridge::state::AppState;

/// How the simulated device reacts to requests.
#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    /// Never answer anything
    pub silent: bool,
    /// Answer `/channel/{n}/refresh` with the channel's EQ state
    pub answer_refresh: bool,
    /// Ignore the first refresh request
    pub drop_first_refresh: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            silent: false,
            answer_refresh: true,
            drop_first_refresh: false,
        }
    }
}

#[derive(Default)]
struct DeviceState {
    names: BTreeMap<u32, String>,
    values: HashMap<String, f32>,
    received: Vec<String>,
    refreshes: usize,
    bridge: Option<SocketAddr>,
}

pub struct FakeDevice {
    pub addr: SocketAddr,
    state: Arc<Mutex<DeviceState>>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    pub async fn start(behavior: Behavior, names: &[(u32, &str)]) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let state = Arc::new(Mutex::new(DeviceState {
            names: names
                .iter()
                .map(|(index, name)| (*index, name.to_string()))
                .collect(),
            ..Default::default()
        }));

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            loop {
                let Ok((len, _)) = socket.recv_from(&mut buf).await else {
                    continue;
                };
                let Ok((_, packet)) = rosc::decoder::decode_udp(&buf[..len]) else {
                    continue;
                };
                let mut messages = Vec::new();
                flatten(packet, &mut messages);
                for msg in messages {
                    let replies = handle(&task_state, behavior, msg);
                    let bridge = task_state.lock().bridge;
                    if let Some(bridge) = bridge {
                        for reply in replies {
                            let buf = rosc::encoder::encode(&reply).unwrap();
                            let _ = socket.send_to(&buf, bridge).await;
                        }
                    }
                }
            }
        });

        Self { addr, state, task }
    }

    /// Tell the device where the bridge listens for replies.
    pub fn attach(&self, bridge_listen_port: u16) {
        self.state.lock().bridge = Some(SocketAddr::from(([127, 0, 0, 1], bridge_listen_port)));
    }

    pub fn rename(&self, index: u32, name: &str) {
        self.state.lock().names.insert(index, name.to_string());
    }

    /// Every address received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    pub fn count_received(&self, address: &str) -> usize {
        self.state
            .lock()
            .received
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }

    /// Stored value of one parameter, if it was ever written.
    pub fn value(&self, address: &str) -> Option<f32> {
        self.state.lock().values.get(address).copied()
    }

    pub fn refreshes(&self) -> usize {
        self.state.lock().refreshes
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                flatten(p, out);
            }
        }
    }
}

/// Value a parameter has before anything was written to it.
fn initial_value(key: &ParamKey) -> f32 {
    match key {
        ParamKey::StageEnable(_) => 0.0,
        ParamKey::Slot {
            param: Param::BandEnable,
            ..
        } => 0.0,
        ParamKey::Slot {
            param: Param::Type, ..
        } => 0.0,
        ParamKey::Slot { .. } => 0.5,
    }
}

fn handle(state: &Mutex<DeviceState>, behavior: Behavior, msg: OscMessage) -> Vec<OscPacket> {
    let mut state = state.lock();
    state.received.push(msg.addr.clone());

    match DeviceAddress::parse(&msg.addr) {
        Some(DeviceAddress::Param { .. }) => {
            if let Some(OscType::Float(v)) = msg.args.first() {
                state.values.insert(msg.addr.clone(), *v);
            }
            Vec::new()
        }
        Some(DeviceAddress::NameQuery) if !behavior.silent => state
            .names
            .iter()
            .map(|(index, name)| {
                OscPacket::Message(OscMessage {
                    addr: DeviceAddress::TrackName { channel: *index }.to_string(),
                    args: vec![OscType::String(name.clone())],
                })
            })
            .collect(),
        Some(DeviceAddress::ChannelRefresh { channel }) => {
            state.refreshes += 1;
            if behavior.silent || !behavior.answer_refresh {
                return Vec::new();
            }
            if behavior.drop_first_refresh && state.refreshes == 1 {
                return Vec::new();
            }
            let content = ParamKey::all()
                .iter()
                .map(|key| {
                    let addr = DeviceAddress::Param { channel, key: *key }.to_string();
                    let value = state
                        .values
                        .get(&addr)
                        .copied()
                        .unwrap_or_else(|| initial_value(key));
                    OscPacket::Message(OscMessage {
                        addr,
                        args: vec![OscType::Float(value)],
                    })
                })
                .collect();
            vec![OscPacket::Bundle(OscBundle {
                timetag: OscTime {
                    seconds: 0,
                    fractional: 1,
                },
                content,
            })]
        }
        _ => Vec::new(),
    }
}

/// Bridge configuration pointing at a simulated device.
pub fn test_config(device: &FakeDevice) -> Config {
    Config {
        port: 0,
        device_host: "127.0.0.1".to_string(),
        device_send_port: device.addr.port(),
        device_listen_port: 0,
        read_timeout: Duration::from_millis(300),
        name_wait: Duration::from_millis(200),
        ..Config::default()
    }
}

/// Start a bridge wired to a fresh simulated device.
pub async fn start_bridge(behavior: Behavior, names: &[(u32, &str)]) -> (AppState, FakeDevice) {
    let device = FakeDevice::start(behavior, names).await;
    let state = AppState::start(test_config(&device)).await.unwrap();
    device.attach(state.transport().local_addr().port());
    (state, device)
}
