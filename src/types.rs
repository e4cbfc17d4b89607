use crate::status::ZoneStatus;
use serde::{Deserialize, Serialize};

/// Zone identifier (`11`-`16` on a single six-zone amplifier)
pub type Zone = u8;

/// Zones of the reference deployment
pub const DEFAULT_ZONES: [Zone; 6] = [11, 12, 13, 14, 15, 16];

/// Best-known state of a zone returned by a query
///
/// Serializes to the bare status object, or to `{"zone": N}` when the zone
/// has never reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneState {
    /// A status reply, either fresh or the last one cached
    Reported(ZoneStatus),

    /// No status has ever been received for this zone
    Unknown { zone: Zone },
}

impl ZoneState {
    /// Zone this state belongs to
    pub fn zone(&self) -> Zone {
        match self {
            ZoneState::Reported(status) => status.zone,
            ZoneState::Unknown { zone } => *zone,
        }
    }

    /// The reported status, if any
    pub fn status(&self) -> Option<&ZoneStatus> {
        match self {
            ZoneState::Reported(status) => Some(status),
            ZoneState::Unknown { .. } => None,
        }
    }

    /// Whether the zone has ever reported
    pub fn is_known(&self) -> bool {
        matches!(self, ZoneState::Reported(_))
    }
}

/// Tone settings applied to every zone by [`AmpClient::apply_defaults`](crate::AmpClient::apply_defaults)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneDefaults {
    pub bass: u8,
    pub treble: u8,
    pub balance: u8,
}

impl Default for ToneDefaults {
    fn default() -> Self {
        Self {
            bass: 13,
            treble: 8,
            balance: 7,
        }
    }
}

/// Result of a set command: the wire command sent and the refreshed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    pub state: ZoneState,
}
