//! Correlation of asynchronous device replies with logical reads.
//!
//! OSC has no request ids, so a read is matched by address: the bridge sends a
//! refresh trigger for a channel and registers a [`PendingRead`] listing every
//! parameter it expects back. The listener feeds each inbound value to every
//! live read of that channel that expects it. A read completes when all
//! expected parameters have been seen at least once, or times out and returns
//! what it has.
//!
//! Writes are fire-and-forget: one message per parameter, no acknowledgement
//! and no retry.

use crate::eq::ParamWrite;
use crate::osc::{arg_as_f32, DeviceAddress, OscSubscriber, OscTransport, ParamKey, TransportError};
use parking_lot::Mutex;
use rosc::OscType;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Identifier of one in-flight read.
pub type ReadId = u64;

/// How a read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Every expected parameter was reported
    Complete,
    /// The deadline passed first
    TimedOut,
}

/// Values collected by a resolved read.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub channel: u32,
    pub status: ReadStatus,
    pub values: HashMap<ParamKey, f32>,
}

impl ReadOutcome {
    pub fn is_partial(&self) -> bool {
        self.status == ReadStatus::TimedOut
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    /// Registered, nothing received yet
    Created,
    /// At least one expected value received
    Collecting,
}

/// A live read. Removed from the table as soon as it resolves.
struct PendingRead {
    channel: u32,
    expected: HashSet<ParamKey>,
    collected: HashMap<ParamKey, f32>,
    phase: ReadPhase,
    done: oneshot::Sender<ReadOutcome>,
}

impl PendingRead {
    fn is_covered(&self) -> bool {
        self.collected.len() == self.expected.len()
    }

    fn into_outcome(self, status: ReadStatus) -> (ReadOutcome, oneshot::Sender<ReadOutcome>) {
        (
            ReadOutcome {
                channel: self.channel,
                status,
                values: self.collected,
            },
            self.done,
        )
    }
}

/// Matches inbound OSC values to in-flight reads.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

struct CorrelatorInner {
    pending: Mutex<HashMap<ReadId, PendingRead>>,
    next_id: AtomicU64,
    deadline: Duration,
}

/// Removes its read from the table when dropped, so an abandoned caller
/// never leaves a stale entry behind.
pub(crate) struct PendingGuard {
    id: ReadId,
    inner: Arc<CorrelatorInner>,
}

impl PendingGuard {
    pub(crate) fn id(&self) -> ReadId {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.id);
    }
}

impl Correlator {
    /// Create a correlator whose reads resolve within `deadline`.
    pub fn new(deadline: Duration) -> Self {
        Self {
            inner: Arc::new(CorrelatorInner {
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                deadline,
            }),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.inner.deadline
    }

    /// Number of reads currently waiting for device values.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Register a read and return its guard and completion receiver.
    pub(crate) fn register(
        &self,
        channel: u32,
        expected: HashSet<ParamKey>,
    ) -> (PendingGuard, oneshot::Receiver<ReadOutcome>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, rx) = oneshot::channel();
        self.inner.pending.lock().insert(
            id,
            PendingRead {
                channel,
                expected,
                collected: HashMap::new(),
                phase: ReadPhase::Created,
                done,
            },
        );
        (
            PendingGuard {
                id,
                inner: self.inner.clone(),
            },
            rx,
        )
    }

    fn is_idle(&self, id: ReadId) -> bool {
        self.inner
            .pending
            .lock()
            .get(&id)
            .is_some_and(|read| read.phase == ReadPhase::Created)
    }

    /// Resolve a read as timed out, unless it completed in the meantime.
    fn expire(
        &self,
        guard: &PendingGuard,
        channel: u32,
        rx: &mut oneshot::Receiver<ReadOutcome>,
    ) -> ReadOutcome {
        let removed = self.inner.pending.lock().remove(&guard.id());
        match removed {
            Some(read) => read.into_outcome(ReadStatus::TimedOut).0,
            None => rx.try_recv().unwrap_or(ReadOutcome {
                channel,
                status: ReadStatus::TimedOut,
                values: HashMap::new(),
            }),
        }
    }

    /// Read the given parameters of a channel from the device.
    ///
    /// Sends the channel's refresh trigger and waits for the values to come
    /// back. If nothing at all has arrived by half the deadline the trigger is
    /// sent once more. Missing data never fails the read; it yields a
    /// [`ReadStatus::TimedOut`] outcome with whatever was collected. Only a
    /// failure to send the initial trigger is an error.
    pub async fn read(
        &self,
        transport: &OscTransport,
        channel: u32,
        expected: HashSet<ParamKey>,
    ) -> Result<ReadOutcome, TransportError> {
        let deadline = Instant::now() + self.inner.deadline;
        let (guard, mut rx) = self.register(channel, expected);
        let trigger = DeviceAddress::ChannelRefresh { channel };

        transport.send(&trigger, vec![OscType::Float(1.0)]).await?;

        let half = Instant::now() + self.inner.deadline / 2;
        let mut closed = false;
        match tokio::time::timeout_at(half, &mut rx).await {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(_)) => closed = true,
            Err(_) => {}
        }

        if !closed && self.is_idle(guard.id()) {
            debug!("No reply for channel {} yet, re-sending refresh", channel);
            if let Err(e) = transport.send(&trigger, vec![OscType::Float(1.0)]).await {
                warn!("Failed to re-send refresh for channel {}: {}", channel, e);
            }
        }

        if !closed {
            if let Ok(Ok(outcome)) = tokio::time::timeout_at(deadline, &mut rx).await {
                return Ok(outcome);
            }
        }

        let outcome = self.expire(&guard, channel, &mut rx);
        debug!(
            "Read of channel {} timed out with {} values",
            channel,
            outcome.values.len()
        );
        Ok(outcome)
    }

    /// Send parameter values to a channel, one message each.
    ///
    /// Returns the number of messages sent. Stops at the first send failure.
    pub async fn write(
        &self,
        transport: &OscTransport,
        channel: u32,
        writes: &[ParamWrite],
    ) -> Result<usize, TransportError> {
        for write in writes {
            let address = DeviceAddress::Param {
                channel,
                key: write.key,
            };
            transport
                .send(&address, vec![OscType::Float(write.value)])
                .await?;
        }
        Ok(writes.len())
    }

    /// Feed one device value to every live read that expects it.
    fn collect(&self, channel: u32, key: ParamKey, value: f32) {
        let mut pending = self.inner.pending.lock();

        let mut covered = Vec::new();
        for (id, read) in pending.iter_mut() {
            if read.channel != channel || !read.expected.contains(&key) {
                continue;
            }
            read.collected.insert(key, value);
            read.phase = ReadPhase::Collecting;
            if read.is_covered() {
                covered.push(*id);
            }
        }

        for id in covered {
            if let Some(read) = pending.remove(&id) {
                let (outcome, done) = read.into_outcome(ReadStatus::Complete);
                // The caller may already have given up
                let _ = done.send(outcome);
            }
        }
    }
}

impl OscSubscriber for Correlator {
    fn on_message(&self, address: &DeviceAddress, args: &[OscType]) {
        if let DeviceAddress::Param { channel, key } = address {
            match args.first().and_then(arg_as_f32) {
                Some(value) => self.collect(*channel, *key, value),
                None => debug!("Ignoring non-numeric value for {}", address),
            }
        }
    }
}
