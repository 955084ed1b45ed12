//! Test data builders for creating test objects

use ohlcv_relay::types::{Record, Row};

/// Header of a NASDAQ historical quotes export
pub const NASDAQ_HEADER: &str = "Date, Close/Last, Volume, Open, High, Low";

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// 2024-03-15 00:00:00 UTC
pub const BASE_TIMESTAMP: f64 = 1_710_460_800.0;

/// Builder for creating test Rows in the NASDAQ column layout
pub struct RowBuilder {
    date: String,
    close: String,
    volume: String,
    open: String,
    high: String,
    low: String,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self {
            date: "03/15/2024".to_string(),
            close: "$172.62".to_string(),
            volume: "121664700".to_string(),
            open: "$171.17".to_string(),
            high: "$172.62".to_string(),
            low: "$170.285".to_string(),
        }
    }

    pub fn date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn close(mut self, close: &str) -> Self {
        self.close = close.to_string();
        self
    }

    pub fn volume(mut self, volume: &str) -> Self {
        self.volume = volume.to_string();
        self
    }

    pub fn build(self) -> Row {
        Row::new()
            .with("Date", self.date)
            .with(" Close/Last", self.close)
            .with(" Volume", self.volume)
            .with(" Open", self.open)
            .with(" High", self.high)
            .with(" Low", self.low)
    }
}

impl Default for RowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` valid rows on consecutive days, volume equal to the row number
pub fn daily_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            Row::new()
                .with("Date", format!("{}", BASE_TIMESTAMP + i as f64 * SECONDS_PER_DAY))
                .with("Close", format!("{:.2}", 100.0 + i as f64))
                .with("Volume", i.to_string())
                .with("Open", format!("{:.2}", 99.5 + i as f64))
                .with("High", format!("{:.2}", 101.0 + i as f64))
                .with("Low", format!("{:.2}", 98.0 + i as f64))
        })
        .collect()
}

/// A NASDAQ-style CSV document with `count` data rows
pub fn nasdaq_csv(count: usize) -> String {
    let mut text = format!("{}\r\n", NASDAQ_HEADER);
    for i in 0..count {
        let day = i % 28 + 1;
        text.push_str(&format!(
            "03/{:02}/2024,${:.2},{},${:.2},${:.2},${:.2}\r\n",
            day,
            170.0 + i as f64,
            1_000_000 + i,
            169.5 + i as f64,
            171.0 + i as f64,
            168.0 + i as f64
        ));
    }
    text
}

/// Record on day `day` after [`BASE_TIMESTAMP`], volume `day`
pub fn record(day: i64) -> Record {
    Record::new(
        BASE_TIMESTAMP + day as f64 * SECONDS_PER_DAY,
        100.0,
        101.0,
        99.0,
        100.5,
        day,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_builder() {
        let row = RowBuilder::new().close("$1.00").build();
        assert_eq!(row.get(" Close/Last"), Some("$1.00"));
        assert_eq!(row.len(), 6);
    }
}
