use crate::protocol::{FRAME_MARKER, QUERY_MARKER, REPLY_MARKER};
use crate::types::Zone;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum payload length of a status reply (eleven two-digit fields)
pub const MIN_STATUS_DIGITS: usize = 22;

const STATUS_FIELDS: usize = MIN_STATUS_DIGITS / 2;

/// One two-character field of a status reply
///
/// Fields are numeric in every reply seen so far; anything else is kept
/// verbatim instead of being coerced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u8),
    Raw(String),
}

impl FieldValue {
    /// Convert a two-byte token
    pub fn from_token(token: &[u8]) -> Self {
        match token {
            [tens, ones] if tens.is_ascii_digit() && ones.is_ascii_digit() => {
                FieldValue::Number((tens - b'0') * 10 + (ones - b'0'))
            }
            _ => FieldValue::Raw(String::from_utf8_lossy(token).into_owned()),
        }
    }

    /// Numeric value, if the field was numeric
    pub fn as_number(&self) -> Option<u8> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Raw(_) => None,
        }
    }

    /// `true` for `01`, `false` for `00`, `None` otherwise
    pub fn as_flag(&self) -> Option<bool> {
        match self.as_number() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n:02}"),
            FieldValue::Raw(raw) => f.write_str(raw),
        }
    }
}

/// Full status of one zone as reported by the amplifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub zone: Zone,
    pub power: FieldValue,
    /// Public-address flag
    pub pa: FieldValue,
    pub mute: FieldValue,
    /// Do-not-disturb/device type field
    pub device_type: FieldValue,
    pub volume: FieldValue,
    pub treble: FieldValue,
    pub bass: FieldValue,
    pub balance: FieldValue,
    /// Selected source channel
    pub channel: FieldValue,
    pub loudness: FieldValue,
}

impl ZoneStatus {
    /// Whether the zone reports power on
    pub fn is_powered(&self) -> Option<bool> {
        self.power.as_flag()
    }

    /// Whether the zone reports mute on
    pub fn is_muted(&self) -> Option<bool> {
        self.mute.as_flag()
    }
}

/// Check whether a line is the amplifier echoing a query back (`#?11`, `?11`)
pub fn is_query_echo(line: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix(FRAME_MARKER).unwrap_or(line);
    line.starts_with(QUERY_MARKER)
}

/// Strip a leading `#>` or `>` marker and any whitespace following it
fn strip_reply_marker(line: &str) -> &str {
    let unframed = line.strip_prefix(FRAME_MARKER).unwrap_or(line);
    match unframed.strip_prefix(REPLY_MARKER) {
        Some(payload) => payload.trim_start(),
        None => line,
    }
}

/// Decode a received line into a zone status
///
/// Returns `None` for query echoes and for anything that is not an even-length
/// run of at least 22 digits after the optional reply marker. Fields past the
/// eleventh are ignored.
///
/// # Example
///
/// ```
/// use multizone_amp::{decode_status_line, FieldValue};
///
/// let status = decode_status_line("#>1100010000302007100500").unwrap();
/// assert_eq!(status.zone, 11);
/// assert_eq!(status.volume, FieldValue::Number(30));
/// assert!(decode_status_line("#?11").is_none());
/// ```
pub fn decode_status_line(raw: &str) -> Option<ZoneStatus> {
    let line = raw.trim();
    if line.is_empty() || is_query_echo(line) {
        return None;
    }

    let payload = strip_reply_marker(line).as_bytes();
    if payload.len() < MIN_STATUS_DIGITS
        || payload.len() % 2 != 0
        || !payload.iter().all(u8::is_ascii_digit)
    {
        return None;
    }

    let tokens: Vec<FieldValue> = payload
        .chunks(2)
        .take(STATUS_FIELDS)
        .map(FieldValue::from_token)
        .collect();
    let fields: [FieldValue; STATUS_FIELDS] = tokens.try_into().ok()?;
    let [zone, power, pa, mute, device_type, volume, treble, bass, balance, channel, loudness] =
        fields;

    let zone = match zone {
        FieldValue::Number(zone) => zone,
        FieldValue::Raw(raw_zone) => {
            // Unreachable after the digit check above
            tracing::error!("Status line {:?} has non-numeric zone {:?}", raw, raw_zone);
            return None;
        }
    };

    Some(ZoneStatus {
        zone,
        power,
        pa,
        mute,
        device_type,
        volume,
        treble,
        bass,
        balance,
        channel,
        loudness,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#>1100010000302007100500";

    #[test]
    fn decodes_reference_line() {
        let status = decode_status_line(SAMPLE).unwrap();
        assert_eq!(status.zone, 11);
        assert_eq!(status.power, FieldValue::Number(0));
        assert_eq!(status.pa, FieldValue::Number(1));
        assert_eq!(status.mute, FieldValue::Number(0));
        assert_eq!(status.device_type, FieldValue::Number(0));
        assert_eq!(status.volume, FieldValue::Number(30));
        assert_eq!(status.treble, FieldValue::Number(20));
        assert_eq!(status.bass, FieldValue::Number(7));
        assert_eq!(status.balance, FieldValue::Number(10));
        assert_eq!(status.channel, FieldValue::Number(5));
        assert_eq!(status.loudness, FieldValue::Number(0));
        assert_eq!(status.is_powered(), Some(false));
        assert_eq!(status.is_muted(), Some(false));
    }

    #[test]
    fn accepts_all_marker_forms() {
        let expected = decode_status_line(SAMPLE).unwrap();
        for line in [
            ">1100010000302007100500",
            "1100010000302007100500",
            "#> 1100010000302007100500",
            "  #>1100010000302007100500\n",
        ] {
            assert_eq!(decode_status_line(line).as_ref(), Some(&expected), "{line:?}");
        }
    }

    #[test]
    fn every_field_maps_to_its_own_position() {
        let status = decode_status_line(">1101020304050607080910").unwrap();
        let fields = [
            &status.power,
            &status.pa,
            &status.mute,
            &status.device_type,
            &status.volume,
            &status.treble,
            &status.bass,
            &status.balance,
            &status.channel,
            &status.loudness,
        ];
        for (expected, field) in (1u8..=10).zip(fields) {
            assert_eq!(field, &FieldValue::Number(expected));
        }
    }

    #[test]
    fn decoding_is_repeatable() {
        assert_eq!(decode_status_line(SAMPLE), decode_status_line(SAMPLE));
    }

    #[test]
    fn ignores_trailing_fields() {
        let status = decode_status_line(">11000100003020071005009912").unwrap();
        assert_eq!(status, decode_status_line(SAMPLE).unwrap());
    }

    #[test]
    fn rejects_echoes_and_noise() {
        for line in [
            "",
            "hello",
            "#?11",
            "?11",
            "12345",
            // 21 digits
            ">110001000030200710050",
            // 23 digits
            ">11000100003020071005001",
            ">11000100003020071005AB",
            "#1100010000302007100500",
            ">>1100010000302007100500",
        ] {
            assert!(decode_status_line(line).is_none(), "{line:?}");
        }
    }

    #[test]
    fn non_numeric_token_is_kept_raw() {
        assert_eq!(FieldValue::from_token(b"A1"), FieldValue::Raw("A1".to_string()));
        assert_eq!(FieldValue::from_token(b"07"), FieldValue::Number(7));
        assert_eq!(FieldValue::Raw("A1".to_string()).as_number(), None);
    }

    #[test]
    fn status_serializes_numbers_as_integers() {
        let status = decode_status_line(SAMPLE).unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["zone"], 11);
        assert_eq!(json["volume"], 30);
        assert_eq!(json["device_type"], 0);
    }
}
