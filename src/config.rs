use crate::error::{AmpError, Result};
use crate::protocol::LINE_TERMINATOR;
use crate::types::{Zone, DEFAULT_ZONES};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT_PATH: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(1200);

/// Link and zone configuration
///
/// # Example
///
/// ```
/// use multizone_amp::AmpConfig;
/// use std::time::Duration;
///
/// let config = AmpConfig::default()
///     .with_port_path("/dev/ttyUSB1")
///     .with_zones([11, 12])
///     .with_reply_timeout(Duration::from_millis(500));
/// assert_eq!(config.zones, vec![11, 12]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmpConfig {
    /// Serial device node
    pub port_path: PathBuf,
    /// Line speed applied when the port is opened
    pub baud_rate: u32,
    /// Line delimiter, carriage return unless overridden
    pub delimiter: String,
    /// Zones present on the amplifier
    pub zones: Vec<Zone>,
    /// How long a query waits for a fresh reply before falling back
    pub reply_timeout: Duration,
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            port_path: PathBuf::from(DEFAULT_PORT_PATH),
            baud_rate: DEFAULT_BAUD_RATE,
            delimiter: LINE_TERMINATOR.to_string(),
            zones: DEFAULT_ZONES.to_vec(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl AmpConfig {
    /// Read configuration from the process environment
    ///
    /// Recognized variables: `SERIAL_PORT`, `BAUD`, `SERIAL_DELIM`,
    /// `AMP_ZONES` (comma separated) and `REPLY_TIMEOUT_MS`. Unset variables
    /// keep their defaults. Call `dotenvy::dotenv()` first to pick up a
    /// `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("SERIAL_PORT") {
            config.port_path = PathBuf::from(path);
        }
        if let Some(baud) = lookup("BAUD") {
            config.baud_rate = parse_number("BAUD", &baud)?;
        }
        if let Some(delimiter) = lookup("SERIAL_DELIM") {
            config.delimiter = parse_delimiter(&delimiter)?;
        }
        if let Some(zones) = lookup("AMP_ZONES") {
            config.zones = parse_zones(&zones)?;
        }
        if let Some(timeout) = lookup("REPLY_TIMEOUT_MS") {
            config.reply_timeout = Duration::from_millis(parse_number("REPLY_TIMEOUT_MS", &timeout)?);
        }

        Ok(config)
    }

    /// Set the serial device node
    pub fn with_port_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.port_path = path.into();
        self
    }

    /// Set the line speed used when the port is opened
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the line delimiter
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set the zones present on the amplifier
    pub fn with_zones(mut self, zones: impl IntoIterator<Item = Zone>) -> Self {
        self.zones = zones.into_iter().collect();
        self
    }

    /// Set how long queries wait for a reply
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AmpError::Config(format!("{key} must be a number, got {value:?}")))
}

/// Accepts the delimiter literally or as a `\r`/`\n` escape
fn parse_delimiter(value: &str) -> Result<String> {
    let delimiter = value.replace("\\r", "\r").replace("\\n", "\n");
    if delimiter.is_empty() {
        return Err(AmpError::Config("SERIAL_DELIM must not be empty".to_string()));
    }
    Ok(delimiter)
}

fn parse_zones(value: &str) -> Result<Vec<Zone>> {
    let zones = value
        .split(',')
        .map(str::trim)
        .filter(|zone| !zone.is_empty())
        .map(|zone| parse_number::<Zone>("AMP_ZONES", zone))
        .collect::<Result<Vec<_>>>()?;

    if zones.is_empty() {
        return Err(AmpError::Config("AMP_ZONES must list at least one zone".to_string()));
    }
    Ok(zones)
}
