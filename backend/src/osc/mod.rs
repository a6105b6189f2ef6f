//! OSC transport to TotalMix FX.
//!
//! This module provides:
//! - the send side: one UDP socket that encodes and fires messages at the device
//! - the listen side: a background task decoding inbound datagrams and
//!   dispatching each message to every registered [`OscSubscriber`]
//! - liveness counters for the status endpoint

pub mod address;

use parking_lot::{Mutex, RwLock};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

pub use address::{DeviceAddress, Param, ParamKey, Stage};

/// Receive buffer size; TotalMix never sends datagrams anywhere near this.
const RECV_BUFFER_SIZE: usize = 8192;

/// OSC transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Cannot bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode OSC message {address}: {reason}")]
    Encode { address: String, reason: String },
    #[error("Failed to send OSC message {address}: {source}")]
    Send {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Receiver of decoded inbound OSC messages.
///
/// Called synchronously on the listener task for every message whose address
/// is in the address table. Implementations must not block.
pub trait OscSubscriber: Send + Sync {
    fn on_message(&self, address: &DeviceAddress, args: &[OscType]);
}

/// Snapshot of transport counters.
#[derive(Debug, Clone, Copy)]
pub struct TransportStats {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub packets_dropped: u64,
    /// Time since the last inbound message, if any was ever received
    pub last_message_age: Option<Duration>,
}

/// Process-wide handle to the OSC socket pair.
#[derive(Clone)]
pub struct OscTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    send_socket: UdpSocket,
    device_addr: SocketAddr,
    listen_addr: SocketAddr,
    subscribers: RwLock<Vec<Arc<dyn OscSubscriber>>>,
    shutdown_tx: broadcast::Sender<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    packets_dropped: AtomicU64,
    last_message: Mutex<Option<Instant>>,
    debug: bool,
}

impl OscTransport {
    /// Bind the listen socket and a send socket, and start the listener task.
    ///
    /// Failing to bind the listen port is fatal for the bridge; the error is
    /// returned as-is and never retried.
    pub async fn bind(
        listen_addr: SocketAddr,
        device_addr: SocketAddr,
        debug: bool,
    ) -> Result<Self, TransportError> {
        let recv_socket = UdpSocket::bind(listen_addr)
            .await
            .map_err(|source| TransportError::Bind {
                port: listen_addr.port(),
                source,
            })?;
        let listen_addr = recv_socket
            .local_addr()
            .map_err(|source| TransportError::Bind {
                port: listen_addr.port(),
                source,
            })?;

        let send_bind: SocketAddr = if device_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let send_socket = UdpSocket::bind(send_bind)
            .await
            .map_err(|source| TransportError::Bind { port: 0, source })?;

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let inner = Arc::new(TransportInner {
            send_socket,
            device_addr,
            listen_addr,
            subscribers: RwLock::new(Vec::new()),
            shutdown_tx: shutdown_tx.clone(),
            listener: Mutex::new(None),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            last_message: Mutex::new(None),
            debug,
        });

        let listener_inner = inner.clone();
        let listener_shutdown = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            Self::run_listener(recv_socket, listener_inner, listener_shutdown).await;
        });
        *inner.listener.lock() = Some(handle);

        info!(
            "OSC transport ready (sending to {}, listening on {})",
            device_addr, listen_addr
        );

        Ok(Self { inner })
    }

    /// Register a subscriber for inbound messages.
    pub fn subscribe(&self, subscriber: Arc<dyn OscSubscriber>) {
        self.inner.subscribers.write().push(subscriber);
    }

    /// Address of the listen socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.listen_addr
    }

    /// Address OSC commands are sent to.
    pub fn device_addr(&self) -> SocketAddr {
        self.inner.device_addr
    }

    /// Encode and send one message to the device.
    ///
    /// Returns once the datagram is accepted by the local network stack;
    /// delivery is not confirmed.
    pub async fn send(
        &self,
        address: &DeviceAddress,
        args: Vec<OscType>,
    ) -> Result<(), TransportError> {
        let addr = address.to_string();
        if self.inner.debug {
            debug!("OSC out {} {:?}", addr, args);
        }

        let packet = OscPacket::Message(OscMessage {
            addr: addr.clone(),
            args,
        });
        let buf = rosc::encoder::encode(&packet).map_err(|e| TransportError::Encode {
            address: addr.clone(),
            reason: format!("{:?}", e),
        })?;

        self.inner
            .send_socket
            .send_to(&buf, self.inner.device_addr)
            .await
            .map_err(|source| TransportError::Send {
                address: addr,
                source,
            })?;
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current transport counters.
    pub fn stats(&self) -> TransportStats {
        let last_message = *self.inner.last_message.lock();
        TransportStats {
            messages_received: self.inner.messages_received.load(Ordering::Relaxed),
            messages_sent: self.inner.messages_sent.load(Ordering::Relaxed),
            packets_dropped: self.inner.packets_dropped.load(Ordering::Relaxed),
            last_message_age: last_message.map(|t| t.elapsed()),
        }
    }

    /// Stop the listener and release the listen socket.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(());
        let handle = self.inner.listener.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("OSC listener ended abnormally: {}", e);
            }
            info!("OSC listener stopped");
        }
    }

    /// Run the OSC listener loop.
    async fn run_listener(
        socket: UdpSocket,
        inner: Arc<TransportInner>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("OSC listener shutting down");
                    break;
                }
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => inner.handle_datagram(&buf[..len], from),
                        Err(e) => {
                            // Windows reports ICMP port-unreachable as a recv error
                            warn!("Error receiving OSC packet: {}", e);
                        }
                    }
                }
            }
        }
    }
}

impl TransportInner {
    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        match rosc::decoder::decode_udp(data) {
            Ok((_, packet)) => self.handle_packet(packet),
            Err(e) => {
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Dropping malformed OSC packet ({} bytes) from {}: {:?}",
                    data.len(),
                    from,
                    e
                );
            }
        }
    }

    fn handle_packet(&self, packet: OscPacket) {
        match packet {
            OscPacket::Message(msg) => self.dispatch(msg),
            OscPacket::Bundle(bundle) => {
                for p in bundle.content {
                    self.handle_packet(p);
                }
            }
        }
    }

    fn dispatch(&self, msg: OscMessage) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        *self.last_message.lock() = Some(Instant::now());

        let Some(address) = DeviceAddress::parse(&msg.addr) else {
            if self.debug {
                debug!("OSC in (unmapped) {} {:?}", msg.addr, msg.args);
            }
            return;
        };

        if address == DeviceAddress::Heartbeat {
            trace!("OSC heartbeat");
            return;
        }

        if self.debug {
            debug!("OSC in {} {:?}", msg.addr, msg.args);
        }

        for subscriber in self.subscribers.read().iter() {
            subscriber.on_message(&address, &msg.args);
        }
    }
}

/// Read a numeric OSC argument as `f32`.
///
/// TotalMix sends floats; integers, doubles and booleans are accepted too.
pub fn arg_as_f32(arg: &OscType) -> Option<f32> {
    match arg {
        OscType::Float(v) => Some(*v),
        OscType::Double(v) => Some(*v as f32),
        OscType::Int(v) => Some(*v as f32),
        OscType::Long(v) => Some(*v as f32),
        OscType::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(DeviceAddress, Vec<OscType>)>>,
    }

    impl OscSubscriber for Recorder {
        fn on_message(&self, address: &DeviceAddress, args: &[OscType]) {
            self.seen.lock().push((*address, args.to_vec()));
        }
    }

    fn encode(addr: &str, args: Vec<OscType>) -> Vec<u8> {
        rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        }))
        .unwrap()
    }

    async fn bind_pair() -> (OscTransport, UdpSocket, SocketAddr) {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = OscTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            device.local_addr().unwrap(),
            true,
        )
        .await
        .unwrap();
        let listen = transport.local_addr();
        (transport, device, listen)
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..100 {
            if recorder.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_send_encodes_message() {
        let (transport, device, _) = bind_pair().await;

        transport
            .send(
                &DeviceAddress::ChannelRefresh { channel: 2 },
                vec![OscType::Float(1.0)],
            )
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = device.recv_from(&mut buf).await.unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/channel/2/refresh");
                assert_eq!(msg.args, vec![OscType::Float(1.0)]);
            }
            OscPacket::Bundle(_) => panic!("expected a message"),
        }
        assert_eq!(transport.stats().messages_sent, 1);
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_listener_survives_malformed_packets() {
        let (transport, device, listen) = bind_pair().await;
        let recorder = Arc::new(Recorder::default());
        transport.subscribe(recorder.clone());

        device.send_to(&[0xde, 0xad, 0xbe], listen).await.unwrap();
        device
            .send_to(
                &encode("/channel/1/reqGain2", vec![OscType::Float(0.5)]),
                listen,
            )
            .await
            .unwrap();
        wait_for(&recorder, 1).await;

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            DeviceAddress::Param {
                channel: 1,
                key: ParamKey::Slot {
                    stage: Stage::RoomEq,
                    slot: 2,
                    param: Param::Gain
                }
            }
        );
        let stats = transport.stats();
        assert_eq!(stats.packets_dropped, 1);
        assert!(stats.last_message_age.is_some());
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_bundles_and_unmapped_addresses() {
        let (transport, device, listen) = bind_pair().await;
        let recorder = Arc::new(Recorder::default());
        transport.subscribe(recorder.clone());

        let bundle = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(OscMessage {
                    addr: "/".to_string(),
                    args: vec![],
                }),
                OscPacket::Message(OscMessage {
                    addr: "/1/busOutput".to_string(),
                    args: vec![OscType::Float(1.0)],
                }),
                OscPacket::Message(OscMessage {
                    addr: "/channel/4/trackname".to_string(),
                    args: vec![OscType::String("Main".to_string())],
                }),
            ],
        });
        device
            .send_to(&rosc::encoder::encode(&bundle).unwrap(), listen)
            .await
            .unwrap();
        wait_for(&recorder, 1).await;

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, DeviceAddress::TrackName { channel: 4 });
        assert_eq!(transport.stats().messages_received, 3);
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = OscTransport::bind(
            taken.local_addr().unwrap(),
            "127.0.0.1:7003".parse().unwrap(),
            false,
        )
        .await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn test_arg_as_f32() {
        assert_eq!(arg_as_f32(&OscType::Float(0.25)), Some(0.25));
        assert_eq!(arg_as_f32(&OscType::Int(1)), Some(1.0));
        assert_eq!(arg_as_f32(&OscType::Double(0.5)), Some(0.5));
        assert_eq!(arg_as_f32(&OscType::String("x".into())), None);
    }
}
