//! Core data types for the OHLCV relay
//!
//! # Main Types
//!
//! - [`Row`] - An ordered mapping of column name to raw text, as produced by
//!   the file reader
//! - [`Record`] - A decoded OHLCV tick with a floating point timestamp
//! - [`Field`] - The six logical fields every record carries
//!
//! Records are not validated beyond parse success: a record whose `low` is
//! above its `high` is relayed and stored as-is.

use serde::{Deserialize, Serialize};

/// Logical fields of a record, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Record timestamp (epoch seconds)
    Timestamp,
    /// Closing price
    Close,
    /// Traded volume
    Volume,
    /// Opening price
    Open,
    /// Session high
    High,
    /// Session low
    Low,
}

impl Field {
    /// All fields in the order they appear on the wire
    pub const WIRE_ORDER: [Field; 6] = [
        Field::Timestamp,
        Field::Close,
        Field::Volume,
        Field::Open,
        Field::High,
        Field::Low,
    ];

    /// Canonical column name for this field
    pub fn name(&self) -> &'static str {
        match self {
            Field::Timestamp => "date",
            Field::Close => "close",
            Field::Volume => "volume",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
        }
    }

    /// Column names (normalized, lower case) accepted for this field
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Timestamp => &["date", "timestamp", "time", "datetime"],
            Field::Close => &["close/last", "close", "last"],
            Field::Volume => &["volume", "vol"],
            Field::Open => &["open"],
            Field::High => &["high"],
            Field::Low => &["low"],
        }
    }

    /// Whether the field holds a price (and may carry a currency symbol)
    pub fn is_price(&self) -> bool {
        matches!(self, Field::Close | Field::Open | Field::High | Field::Low)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single OHLCV tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Epoch seconds
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Record {
    /// Create a new record
    pub fn new(timestamp: f64, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True when the close is below the open
    pub fn is_bearish(&self) -> bool {
        self.open > self.close
    }
}

/// One row of a tabular input file
///
/// Columns keep the order of the header they were read under. Lookups are
/// by exact (already normalized) column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row by zipping headers with values
    ///
    /// Extra values beyond the header are dropped; a short row keeps only the
    /// columns it has values for.
    pub fn from_parts<H, V>(headers: &[H], values: &[V]) -> Self
    where
        H: AsRef<str>,
        V: AsRef<str>,
    {
        let fields = headers
            .iter()
            .zip(values.iter())
            .map(|(h, v)| (h.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        Self { fields }
    }

    /// Append a column
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a column in place
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Value of the named column, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(column, value)` pairs in header order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of columns present
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_parts_truncates_to_shorter_side() {
        let row = Row::from_parts(&["Date", "Close", "Volume"], &["1", "2"]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("Close"), Some("2"));
        assert_eq!(row.get("Volume"), None);

        let row = Row::from_parts(&["Date"], &["1", "2", "3"]);
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_row_preserves_header_order() {
        let row = Row::new().with("b", "2").with("a", "1");
        let names: Vec<_> = row.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_field_wire_order() {
        let names: Vec<_> = Field::WIRE_ORDER.iter().map(Field::name).collect();
        assert_eq!(names, vec!["date", "close", "volume", "open", "high", "low"]);
    }

    #[test]
    fn test_bearish() {
        assert!(Record::new(0.0, 10.0, 11.0, 8.0, 9.0, 1).is_bearish());
        assert!(!Record::new(0.0, 9.0, 11.0, 8.0, 10.0, 1).is_bearish());
    }
}
