//! Rust library for controlling multi-zone audio amplifiers over a serial link
//!
//! The amplifier speaks a line-oriented ASCII protocol: set commands such as
//! `<11VO20`, zone queries such as `?11`, and status replies such as
//! `#>1100010000302007100500`. Replies carry no request id, so this library
//! pairs each query with the next status line for the same zone and keeps a
//! cache of the last status seen per zone. It supports:
//!
//! - Power, volume, source, mute, treble, bass and balance control per zone
//! - Status queries with a bounded wait and a cached fallback
//! - A live feed of every status reply
//! - Applying tone defaults to all zones
//!
//! # Quick Start
//!
//! ```no_run
//! use multizone_amp::{AmpClient, AmpConfig, Attribute};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AmpConfig::default().with_port_path("/dev/ttyUSB0");
//!     let client = AmpClient::connect(&config).await?;
//!
//!     let outcome = client.set(11, Attribute::Volume, 20u8).await?;
//!     println!("Sent {}, zone now {:?}", outcome.command, outcome.state);
//!
//!     let mut updates = client.subscribe_status();
//!     while let Ok(status) = updates.recv().await {
//!         println!("Zone {} volume {}", status.zone, status.volume);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Protocol**: pure command and query encoding
//! - **Status**: status line decoding
//! - **Connection**: line channel over the serial device
//! - **Engine**: status cache and per-zone waiter queues
//! - **Client**: connection management and zone access

mod client;
mod config;
mod connection;
mod engine;
mod error;
mod protocol;
mod status;
mod subscription;
mod types;
mod zone;

// Public exports
pub use client::AmpClient;
pub use config::AmpConfig;
pub use connection::{LineChannel, LineReceiver, SerialConnection};
pub use engine::ZoneMonitor;
pub use error::{AmpError, Result};
pub use protocol::{
    encode_command, encode_query, Attribute, CommandValue, FRAME_MARKER, LINE_TERMINATOR,
    MAX_FIELD_VALUE, QUERY_MARKER, REPLY_MARKER, SET_MARKER,
};
pub use status::{decode_status_line, is_query_echo, FieldValue, ZoneStatus, MIN_STATUS_DIGITS};
pub use subscription::StatusReceiver;
pub use types::{CommandOutcome, ToneDefaults, Zone, ZoneState, DEFAULT_ZONES};
pub use zone::ZoneHandle;
