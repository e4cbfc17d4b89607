use crate::error::{AmpError, Result};
use crate::types::Zone;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Leading character of a set command (`<11VO20`)
pub const SET_MARKER: char = '<';

/// Leading character of a zone query (`?11`)
pub const QUERY_MARKER: char = '?';

/// Leading character of a status reply (`>1100...`)
pub const REPLY_MARKER: char = '>';

/// Optional framing character the amplifier puts before replies and echoes
pub const FRAME_MARKER: char = '#';

/// Delimiter terminating every line on the wire
pub const LINE_TERMINATOR: &str = "\r";

/// Largest value that fits the two-digit wire field
pub const MAX_FIELD_VALUE: u32 = 99;

/// Controllable zone attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Power,
    Volume,
    Source,
    Mute,
    Treble,
    Bass,
    Balance,
}

impl Attribute {
    /// Every attribute the amplifier accepts
    pub const ALL: [Attribute; 7] = [
        Attribute::Power,
        Attribute::Volume,
        Attribute::Source,
        Attribute::Mute,
        Attribute::Treble,
        Attribute::Bass,
        Attribute::Balance,
    ];

    /// Two-letter wire code
    pub fn code(self) -> &'static str {
        match self {
            Attribute::Power => "PR",
            Attribute::Volume => "VO",
            Attribute::Source => "CH",
            Attribute::Mute => "MU",
            Attribute::Treble => "TR",
            Attribute::Bass => "BS",
            Attribute::Balance => "BL",
        }
    }

    /// Lowercase name as used by callers (`"volume"`)
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Power => "power",
            Attribute::Volume => "volume",
            Attribute::Source => "source",
            Attribute::Mute => "mute",
            Attribute::Treble => "treble",
            Attribute::Bass => "bass",
            Attribute::Balance => "balance",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = AmpError;

    fn from_str(s: &str) -> Result<Self> {
        Attribute::ALL
            .into_iter()
            .find(|attribute| attribute.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AmpError::UnsupportedAttribute(s.to_string()))
    }
}

/// Value carried by a set command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    /// On/off, encoded as `01`/`00`
    Flag(bool),
    /// Numeric level, encoded as a zero-padded two-digit decimal
    Level(u32),
}

impl CommandValue {
    fn render(self, attribute: Attribute) -> Result<String> {
        match self {
            CommandValue::Flag(true) => Ok("01".to_string()),
            CommandValue::Flag(false) => Ok("00".to_string()),
            CommandValue::Level(value) if value <= MAX_FIELD_VALUE => Ok(format!("{value:02}")),
            CommandValue::Level(value) => Err(AmpError::ValueOutOfRange {
                attribute: attribute.code(),
                value,
            }),
        }
    }
}

impl From<bool> for CommandValue {
    fn from(value: bool) -> Self {
        CommandValue::Flag(value)
    }
}

impl From<u8> for CommandValue {
    fn from(value: u8) -> Self {
        CommandValue::Level(u32::from(value))
    }
}

impl From<u32> for CommandValue {
    fn from(value: u32) -> Self {
        CommandValue::Level(value)
    }
}

impl FromStr for CommandValue {
    type Err = AmpError;

    /// Accepts `true`/`false`, `on`/`off` or a non-negative integer
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" => Ok(CommandValue::Flag(true)),
            "false" | "off" => Ok(CommandValue::Flag(false)),
            other => other
                .parse::<u32>()
                .map(CommandValue::Level)
                .map_err(|_| AmpError::InvalidValue(s.to_string())),
        }
    }
}

/// Build a set command such as `<11VO20`
///
/// The line terminator is added by the line channel, not here.
pub fn encode_command(
    zone: Zone,
    attribute: Attribute,
    value: impl Into<CommandValue>,
) -> Result<String> {
    let value = value.into().render(attribute)?;
    Ok(format!("{SET_MARKER}{zone}{}{value}", attribute.code()))
}

/// Build a zone status query such as `?11`
pub fn encode_query(zone: Zone) -> String {
    format!("{QUERY_MARKER}{zone}")
}
