use crate::engine::ZoneMonitor;
use crate::error::Result;
use crate::protocol::{encode_command, Attribute, CommandValue};
use crate::types::{CommandOutcome, Zone, ZoneState};
use std::sync::Arc;
use std::time::Duration;

/// Interface for controlling one zone
///
/// Every setter sends the command, then queries the zone and returns the
/// refreshed state.
///
/// # Example
///
/// ```no_run
/// # use multizone_amp::{AmpClient, AmpConfig};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AmpClient::connect(&AmpConfig::default()).await?;
/// let kitchen = client.zone(12)?;
/// kitchen.set_power(true).await?;
/// kitchen.set_volume(18).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ZoneHandle {
    zone: Zone,
    monitor: Arc<ZoneMonitor>,
    reply_timeout: Duration,
}

impl ZoneHandle {
    pub(crate) fn new(zone: Zone, monitor: Arc<ZoneMonitor>, reply_timeout: Duration) -> Self {
        Self {
            zone,
            monitor,
            reply_timeout,
        }
    }

    /// Zone id
    pub fn id(&self) -> Zone {
        self.zone
    }

    /// Last cached state without touching the wire
    pub fn cached(&self) -> ZoneState {
        match self.monitor.cached(self.zone) {
            Some(status) => ZoneState::Reported(status),
            None => ZoneState::Unknown { zone: self.zone },
        }
    }

    /// Query the zone and wait for its status
    pub async fn refresh(&self) -> Result<ZoneState> {
        self.monitor
            .query_and_await(self.zone, self.reply_timeout)
            .await
    }

    /// Set any attribute, returning the command sent and the refreshed state
    pub async fn set(
        &self,
        attribute: Attribute,
        value: impl Into<CommandValue>,
    ) -> Result<CommandOutcome> {
        let command = encode_command(self.zone, attribute, value)?;
        self.monitor.send(&command).await?;
        let state = self.refresh().await?;
        Ok(CommandOutcome { command, state })
    }

    // ========== Power / Mute ==========

    /// Turn the zone on or off
    pub async fn set_power(&self, on: bool) -> Result<ZoneState> {
        Ok(self.set(Attribute::Power, on).await?.state)
    }

    /// Mute or unmute the zone
    pub async fn set_mute(&self, muted: bool) -> Result<ZoneState> {
        Ok(self.set(Attribute::Mute, muted).await?.state)
    }

    // ========== Levels ==========

    /// Set the volume level
    pub async fn set_volume(&self, volume: u8) -> Result<ZoneState> {
        Ok(self.set(Attribute::Volume, volume).await?.state)
    }

    /// Select the input source
    pub async fn set_source(&self, source: u8) -> Result<ZoneState> {
        Ok(self.set(Attribute::Source, source).await?.state)
    }

    /// Set the treble level
    pub async fn set_treble(&self, treble: u8) -> Result<ZoneState> {
        Ok(self.set(Attribute::Treble, treble).await?.state)
    }

    /// Set the bass level
    pub async fn set_bass(&self, bass: u8) -> Result<ZoneState> {
        Ok(self.set(Attribute::Bass, bass).await?.state)
    }

    /// Set the left/right balance
    pub async fn set_balance(&self, balance: u8) -> Result<ZoneState> {
        Ok(self.set(Attribute::Balance, balance).await?.state)
    }
}
