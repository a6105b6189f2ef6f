//! Application state management.

use crate::config::Config;
use crate::correlation::Correlator;
use crate::eq::{self, DecodedEq, FilterSet};
use crate::osc::{OscTransport, Stage, TransportError};
use crate::registry::ChannelRegistry;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Immutable configuration snapshot
    config: Config,
    /// OSC socket pair to TotalMix
    transport: OscTransport,
    /// Output channel names
    registry: Arc<ChannelRegistry>,
    /// In-flight EQ reads
    correlator: Correlator,
}

/// Result of writing a filter list to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Filters placed in Room EQ
    pub room_eq: usize,
    /// Filters placed in the parametric EQ
    pub peq: usize,
    /// OSC messages sent
    pub messages: usize,
}

impl AppState {
    /// Bind the OSC transport and wire the registry and correlator to it.
    ///
    /// A bind failure is returned unchanged so the caller can report it.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let device_addr = config.device_addr()?;
        let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.device_listen_port));
        let transport = OscTransport::bind(listen_addr, device_addr, config.debug).await?;

        let registry = Arc::new(ChannelRegistry::new(config.name_wait));
        let correlator = Correlator::new(config.read_timeout);
        transport.subscribe(registry.clone());
        transport.subscribe(Arc::new(correlator.clone()));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                transport,
                registry,
                correlator,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn transport(&self) -> &OscTransport {
        &self.inner.transport
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
    }

    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    /// Read the current EQ of a channel.
    ///
    /// Missing device data yields a partial result, not an error.
    pub async fn read_eq(&self, channel: u32) -> Result<DecodedEq, TransportError> {
        let outcome = self
            .inner
            .correlator
            .read(&self.inner.transport, channel, eq::read_set())
            .await?;
        let decoded = eq::decode(&outcome.values, outcome.is_partial());
        debug!(
            "Read {} filters from channel {}{}",
            decoded.filters.len(),
            channel,
            if decoded.partial { " (partial)" } else { "" }
        );
        Ok(decoded)
    }

    /// Replace the EQ of a channel with the given filters.
    ///
    /// Every slot not covered by `filters` is switched off.
    pub async fn write_eq(
        &self,
        channel: u32,
        filters: &FilterSet,
    ) -> Result<WriteSummary, TransportError> {
        let writes = eq::encode(filters);
        let messages = self
            .inner
            .correlator
            .write(&self.inner.transport, channel, &writes)
            .await?;
        let summary = WriteSummary {
            room_eq: filters.stage_len(Stage::RoomEq),
            peq: filters.stage_len(Stage::ParametricEq),
            messages,
        };
        info!(
            "Wrote {} filters to channel {} (Room EQ {}, PEQ {})",
            filters.len(),
            channel,
            summary.room_eq,
            summary.peq
        );
        Ok(summary)
    }

    /// Stop the OSC listener.
    pub async fn shutdown(&self) {
        self.inner.transport.stop().await;
    }
}
