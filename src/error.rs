use crate::types::Zone;
use thiserror::Error;

/// Result type for amplifier operations
pub type Result<T> = std::result::Result<T, AmpError>;

/// Errors that can occur when talking to the amplifier
#[derive(Error, Debug)]
pub enum AmpError {
    /// Attribute name is not one of power, volume, source, mute, treble, bass, balance
    #[error("Unsupported attribute: {0}")]
    UnsupportedAttribute(String),

    /// Value does not fit the two-digit wire field
    #[error("Value {value} out of range for {attribute} (expected 0-99)")]
    ValueOutOfRange {
        /// Wire code of the attribute being set
        attribute: &'static str,
        /// Rejected value
        value: u32,
    },

    /// Value text is neither a boolean nor a non-negative integer
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Zone is not part of the configured zone set
    #[error("Unknown zone: {0}")]
    UnknownZone(Zone),

    /// The line channel could not deliver a command
    #[error("Transport send failed: {0}")]
    TransportSend(#[source] std::io::Error),

    /// The line channel has been shut down
    #[error("Connection closed")]
    ConnectionClosed,

    /// Status subscriber fell behind and missed updates
    #[error("Lagged by {0} status updates")]
    Lagged(u64),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}
