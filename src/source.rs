//! Tabular file source
//!
//! Reads a delimited text file into a header plus [`Row`]s. The first line
//! is the header; control and whitespace characters are stripped from
//! header names. Data lines with more values than headers drop the extras,
//! and lines with fewer keep only the columns they have values for.

use crate::error::{RelayError, Result};
use crate::types::Row;
use std::io::Read;
use std::path::Path;

/// A fully-read input file
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    /// Header names in file order
    pub headers: Vec<String>,
    /// Data rows in file order
    pub rows: Vec<Row>,
}

impl CsvTable {
    /// Read a file from disk
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            RelayError::Input(format!("Failed to open file {:?}: {}", path, e))
        })?;

        Self::from_reader(file)
            .map_err(|e| e.with_context(format!("Failed to read {:?}", path)))
    }

    /// Read from any byte source
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut table = CsvTable::default();
        let mut records = reader.records();

        match records.next() {
            Some(header) => {
                let header = header.map_err(|e| RelayError::Input(e.to_string()))?;
                table.headers = header.iter().map(clean_header).collect();
            }
            None => return Ok(table),
        }

        for record in records {
            let record = record.map_err(|e| RelayError::Input(e.to_string()))?;
            let values: Vec<&str> = record.iter().collect();
            table.rows.push(Row::from_parts(&table.headers, &values));
        }

        tracing::debug!(
            "Read {} rows under {} columns",
            table.rows.len(),
            table.headers.len()
        );

        Ok(table)
    }

    /// All values of one column, in row order
    pub fn column(&self, name: &str) -> Vec<&str> {
        self.rows.iter().filter_map(|row| row.get(name)).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn clean_header(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !c.is_whitespace() && *c != '\u{feff}')
        .collect()
}
