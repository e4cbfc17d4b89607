use crate::config::AmpConfig;
use crate::connection::{LineChannel, LineReceiver, SerialConnection};
use crate::engine::ZoneMonitor;
use crate::error::{AmpError, Result};
use crate::protocol::{encode_command, Attribute, CommandValue};
use crate::status::ZoneStatus;
use crate::subscription::StatusReceiver;
use crate::types::{CommandOutcome, ToneDefaults, Zone, ZoneState};
use crate::zone::ZoneHandle;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Client for a multi-zone amplifier
///
/// The `AmpClient` owns the line channel, the status cache and the listener
/// task that feeds received lines into it.
pub struct AmpClient {
    monitor: Arc<ZoneMonitor>,
    reply_timeout: Duration,
    listener: JoinHandle<()>,
}

impl AmpClient {
    /// Open the configured serial device and start listening
    ///
    /// # Example
    ///
    /// ```no_run
    /// use multizone_amp::{AmpClient, AmpConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = AmpConfig::from_env()?;
    ///     let client = AmpClient::connect(&config).await?;
    ///     for state in client.query_all().await? {
    ///         println!("{:?}", state);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: &AmpConfig) -> Result<Self> {
        let (connection, lines) = SerialConnection::open(config).await?;
        Ok(Self::with_channel(Arc::new(connection), lines, config))
    }

    /// Build a client over an existing line channel and its line stream
    pub fn with_channel(
        channel: Arc<dyn LineChannel>,
        lines: LineReceiver,
        config: &AmpConfig,
    ) -> Self {
        let monitor = Arc::new(ZoneMonitor::new(channel, config.zones.iter().copied()));
        let listener = monitor.spawn_listener(lines);

        Self {
            monitor,
            reply_timeout: config.reply_timeout,
            listener,
        }
    }

    /// The underlying correlation engine
    pub fn monitor(&self) -> &Arc<ZoneMonitor> {
        &self.monitor
    }

    /// Configured zones
    pub fn zones(&self) -> &[Zone] {
        self.monitor.zones()
    }

    /// Handle for one configured zone
    pub fn zone(&self, zone: Zone) -> Result<ZoneHandle> {
        if !self.monitor.has_zone(zone) {
            return Err(AmpError::UnknownZone(zone));
        }
        Ok(ZoneHandle::new(zone, self.monitor.clone(), self.reply_timeout))
    }

    /// Query one zone and wait for its status
    pub async fn query(&self, zone: Zone) -> Result<ZoneState> {
        self.monitor.query_and_await(zone, self.reply_timeout).await
    }

    /// Query every configured zone in turn
    pub async fn query_all(&self) -> Result<Vec<ZoneState>> {
        let mut states = Vec::with_capacity(self.zones().len());
        for &zone in self.zones() {
            states.push(self.query(zone).await?);
        }
        Ok(states)
    }

    /// Set an attribute on a zone and return the refreshed state
    pub async fn set(
        &self,
        zone: Zone,
        attribute: Attribute,
        value: impl Into<CommandValue>,
    ) -> Result<CommandOutcome> {
        self.zone(zone)?.set(attribute, value).await
    }

    /// Write bass, treble and balance to every configured zone
    ///
    /// Commands are sent back to back without waiting for replies.
    pub async fn apply_defaults(&self, defaults: &ToneDefaults) -> Result<()> {
        tracing::info!(
            "Applying defaults: bass={} treble={} balance={} to zones {:?}",
            defaults.bass,
            defaults.treble,
            defaults.balance,
            self.zones()
        );

        for &zone in self.zones() {
            for (attribute, value) in [
                (Attribute::Bass, defaults.bass),
                (Attribute::Treble, defaults.treble),
                (Attribute::Balance, defaults.balance),
            ] {
                let command = encode_command(zone, attribute, value)?;
                self.monitor.send(&command).await?;
            }
        }
        Ok(())
    }

    /// Cached status of every zone that has reported
    pub fn snapshot(&self) -> BTreeMap<Zone, ZoneStatus> {
        self.monitor.snapshot()
    }

    /// Subscribe to every status reply the amplifier sends
    pub fn subscribe_status(&self) -> StatusReceiver {
        self.monitor.subscribe()
    }
}

impl Drop for AmpClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
