//! Record codec
//!
//! Converts input rows into wire frames and wire frames back into
//! [`Record`]s. A wire frame is a single comma-delimited text line holding
//! the six logical fields in [`Field::WIRE_ORDER`]:
//!
//! ```text
//! <timestamp>,<close>,<volume>,<open>,<high>,<low>
//! ```
//!
//! Floats are written with Rust's shortest round-trip formatting, so
//! `decode(encode_record(r)) == r` for every finite record. Frames never
//! exceed [`MAX_FRAME_LEN`] bytes; an oversized line is rejected, not
//! truncated.
//!
//! This module does no I/O.

use crate::types::{Field, Record, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Maximum encoded frame size in bytes
pub const MAX_FRAME_LEN: usize = 256;

/// Field delimiter on the wire
pub const DELIMITER: char = ',';

/// Currency symbol stripped from numeric fields
const CURRENCY_SYMBOL: char = '$';

/// Per-record codec failures
///
/// These never abort a stream: the offending row or frame is skipped and
/// counted by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("missing required column '{field}'")]
    MissingField { field: Field },

    #[error("encoded record is {len} bytes, exceeds frame limit of {max}")]
    FormatError { len: usize, max: usize },

    #[error("expected {expected} fields, found {found}")]
    FieldCountMismatch { expected: usize, found: usize },

    #[error("cannot parse {field} from '{value}'")]
    ParseError { field: Field, value: String },

    #[error("frame is not valid UTF-8: {0}")]
    Encoding(String),
}

/// An encoded record ready to be offered to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame(Vec<u8>);

impl WireFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for WireFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode a row into a wire frame
pub fn encode(row: &Row) -> Result<WireFrame, CodecError> {
    let record = Record::from_row(row)?;
    encode_record(&record)
}

/// Encode an already-typed record
pub fn encode_record(record: &Record) -> Result<WireFrame, CodecError> {
    let line = format!(
        "{ts}{d}{close}{d}{volume}{d}{open}{d}{high}{d}{low}",
        ts = record.timestamp,
        close = record.close,
        volume = record.volume,
        open = record.open,
        high = record.high,
        low = record.low,
        d = DELIMITER,
    );

    if line.len() > MAX_FRAME_LEN {
        return Err(CodecError::FormatError {
            len: line.len(),
            max: MAX_FRAME_LEN,
        });
    }

    Ok(WireFrame(line.into_bytes()))
}

/// Decode a complete (reassembled) frame into a record
///
/// On any failure nothing is produced; the whole frame is rejected.
pub fn decode(bytes: &[u8]) -> Result<Record, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Encoding(e.to_string()))?;
    let text = text.trim_end_matches(['\r', '\n']);

    let parts: Vec<&str> = text.split(DELIMITER).collect();
    if parts.len() != Field::WIRE_ORDER.len() {
        return Err(CodecError::FieldCountMismatch {
            expected: Field::WIRE_ORDER.len(),
            found: parts.len(),
        });
    }

    Ok(Record {
        timestamp: parse_number(Field::Timestamp, parts[0])?,
        close: parse_number(Field::Close, parts[1])?,
        volume: parse_volume(parts[2])?,
        open: parse_number(Field::Open, parts[3])?,
        high: parse_number(Field::High, parts[4])?,
        low: parse_number(Field::Low, parts[5])?,
    })
}

impl Record {
    /// Build a record from a row, resolving column aliases
    ///
    /// The date column may hold epoch seconds or a calendar date
    /// (`MM/DD/YYYY`, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, RFC 3339).
    pub fn from_row(row: &Row) -> Result<Self, CodecError> {
        let normalized: Vec<(String, &str)> = row
            .iter()
            .map(|(name, value)| (normalize_header(name), value))
            .collect();

        let lookup = |field: Field| -> Result<&str, CodecError> {
            field
                .aliases()
                .iter()
                .find_map(|alias| {
                    normalized
                        .iter()
                        .find(|(name, _)| name == alias)
                        .map(|(_, v)| *v)
                })
                .ok_or(CodecError::MissingField { field })
        };

        Ok(Record {
            timestamp: parse_timestamp(lookup(Field::Timestamp)?)?,
            close: parse_number(Field::Close, lookup(Field::Close)?)?,
            volume: parse_volume(lookup(Field::Volume)?)?,
            open: parse_number(Field::Open, lookup(Field::Open)?)?,
            high: parse_number(Field::High, lookup(Field::High)?)?,
            low: parse_number(Field::Low, lookup(Field::Low)?)?,
        })
    }
}

/// Strip control, whitespace and byte-order-mark characters from a header
/// name and lower-case it
pub fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !c.is_whitespace() && *c != '\u{feff}')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strip surrounding whitespace and a leading currency symbol
fn strip_numeric(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix(CURRENCY_SYMBOL)
        .map(str::trim_start)
        .unwrap_or(value)
}

fn parse_number(field: Field, raw: &str) -> Result<f64, CodecError> {
    strip_numeric(raw)
        .parse::<f64>()
        .map_err(|_| CodecError::ParseError {
            field,
            value: raw.to_string(),
        })
}

fn parse_volume(raw: &str) -> Result<i64, CodecError> {
    let value = strip_numeric(raw);
    if let Ok(v) = value.parse::<i64>() {
        return Ok(v);
    }

    // Some exports write whole volumes as floats ("1200.0")
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        _ => Err(CodecError::ParseError {
            field: Field::Volume,
            value: raw.to_string(),
        }),
    }
}

fn parse_timestamp(raw: &str) -> Result<f64, CodecError> {
    let value = raw.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return Ok(seconds);
    }

    for format in ["%m/%d/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight.and_utc().timestamp() as f64);
            }
        }
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp() as f64);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis() as f64 / 1000.0);
    }

    Err(CodecError::ParseError {
        field: Field::Timestamp,
        value: raw.to_string(),
    })
}
