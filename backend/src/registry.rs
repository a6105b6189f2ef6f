//! Output channel registry.
//!
//! Caches the `index -> name` mapping TotalMix reports in reply to a name
//! query. The cache is filled on first need, refilled on explicit refresh, and
//! updated by any unsolicited name message the device sends.

use crate::osc::{DeviceAddress, OscSubscriber, OscTransport, TransportError};
use parking_lot::{Mutex as SyncMutex, RwLock};
use rosc::OscType;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use totalmix_bridge_types::Channel;
use tracing::{debug, info, warn};

/// Names arriving closer together than this belong to the same reply burst.
const SETTLE_WINDOW: Duration = Duration::from_millis(50);

/// Placeholder TotalMix reports for channels without a name.
const UNNAMED: &str = "n.a.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid channel: {0}")]
    NotFound(u32),
}

pub struct ChannelRegistry {
    channels: RwLock<BTreeMap<u32, String>>,
    /// Names reported during a refresh, swapped in when it ends
    collected: SyncMutex<Option<BTreeMap<u32, String>>>,
    loaded: AtomicBool,
    /// Bumped on every recorded name
    generation: watch::Sender<u64>,
    /// Serializes name queries so concurrent first requests send one query
    query_lock: Mutex<()>,
    name_wait: Duration,
}

impl ChannelRegistry {
    /// Create an empty registry. `name_wait` bounds how long a query waits
    /// for names.
    pub fn new(name_wait: Duration) -> Self {
        Self {
            channels: RwLock::new(BTreeMap::new()),
            collected: SyncMutex::new(None),
            loaded: AtomicBool::new(false),
            generation: watch::channel(0).0,
            query_lock: Mutex::new(()),
            name_wait,
        }
    }

    /// Query the device for channel names unless the cache is already filled.
    ///
    /// An empty reply leaves the registry unloaded so the next request asks
    /// again.
    pub async fn ensure_loaded(&self, transport: &OscTransport) -> Result<(), TransportError> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.query_lock.lock().await;
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.query(transport).await? {
            self.loaded.store(true, Ordering::Release);
            info!("Channel registry holds {} channels", self.known_count());
        } else {
            debug!("No channel names received within {:?}", self.name_wait);
        }
        Ok(())
    }

    /// Query the device again and replace the cache with its answer.
    ///
    /// Channels missing from the answer are dropped. If the device does not
    /// answer at all the cached names are kept.
    pub async fn refresh(&self, transport: &OscTransport) -> Result<(), TransportError> {
        let _guard = self.query_lock.lock().await;
        *self.collected.lock() = Some(BTreeMap::new());
        let result = self.query(transport).await;
        let fresh = self.collected.lock().take().unwrap_or_default();
        result?;

        if fresh.is_empty() {
            warn!(
                "No channel names received within {:?}, keeping {} cached channels",
                self.name_wait,
                self.known_count()
            );
        } else {
            info!("Channel registry refreshed with {} channels", fresh.len());
            *self.channels.write() = fresh;
            self.loaded.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Send a name query and wait for the reply burst. Returns whether any
    /// name arrived after the query was sent.
    async fn query(&self, transport: &OscTransport) -> Result<bool, TransportError> {
        // Subscribing marks the current generation as seen, so only names
        // recorded from here on count as a reply
        let mut names = self.generation.subscribe();
        transport
            .send(&DeviceAddress::NameQuery, vec![OscType::Float(1.0)])
            .await?;
        Ok(self.wait_for_names(&mut names).await)
    }

    /// Wait until names stop arriving for one settle window after the first
    /// one, or until `name_wait` elapses.
    async fn wait_for_names(&self, names: &mut watch::Receiver<u64>) -> bool {
        let bound = Instant::now() + self.name_wait;
        let mut seen_any = false;
        loop {
            let now = Instant::now();
            if now >= bound {
                return seen_any;
            }
            let until = if seen_any {
                (now + SETTLE_WINDOW).min(bound)
            } else {
                bound
            };
            match tokio::time::timeout_at(until, names.changed()).await {
                Ok(Ok(())) => {
                    names.borrow_and_update();
                    seen_any = true;
                }
                // The sender lives in `self`, so this cannot close while waiting
                Ok(Err(_)) => return seen_any,
                Err(_) if seen_any => return true,
                Err(_) => {}
            }
        }
    }

    /// All known channels, ordered by index.
    pub fn list(&self) -> Vec<Channel> {
        self.channels
            .read()
            .iter()
            .map(|(index, name)| Channel {
                index: *index,
                name: name.clone(),
            })
            .collect()
    }

    /// Look up one channel by index.
    pub fn lookup(&self, index: u32) -> Result<Channel, RegistryError> {
        self.channels
            .read()
            .get(&index)
            .map(|name| Channel {
                index,
                name: name.clone(),
            })
            .ok_or(RegistryError::NotFound(index))
    }

    pub fn known_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Record a channel name reported by the device.
    fn record(&self, index: u32, name: &str) {
        let name = name.trim();
        if name.is_empty() || name == UNNAMED {
            return;
        }
        if let Some(collected) = self.collected.lock().as_mut() {
            collected.insert(index, name.to_string());
        }
        let previous = self.channels.write().insert(index, name.to_string());
        if previous.as_deref() != Some(name) {
            debug!("Channel {} is '{}'", index, name);
        }
        self.generation.send_modify(|n| *n = n.wrapping_add(1));
    }
}

impl OscSubscriber for ChannelRegistry {
    fn on_message(&self, address: &DeviceAddress, args: &[OscType]) {
        if let DeviceAddress::TrackName { channel } = address {
            if let Some(OscType::String(name)) = args.first() {
                self.record(*channel, name);
            }
        }
    }
}
