//! CSV Import Handler
//!
//! Turns a delimited file into [`CsvTable`] rows keyed by header name, with
//! typed accessors that report the offending column and row on failure.

use crate::error::{Error, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// CSV-specific configuration
#[derive(Debug, Clone)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
    pub trim_whitespace: bool,
    pub comment_char: Option<u8>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
            trim_whitespace: true,
            comment_char: None,
        }
    }
}

/// One data row. `row_number` is 1 for the first row after the header.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub row_number: usize,
    pub fields: BTreeMap<String, String>,
}

impl CsvRow {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Non-empty value of `name`.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::MissingField {
                field: name.to_string(),
                row: self.row_number,
            }),
        }
    }

    pub fn parse_i64(&self, name: &str) -> Result<i64> {
        let raw = self.require(name)?;
        raw.parse::<i64>().map_err(|_| self.invalid(name, raw))
    }

    /// Accepts `12.5`, `$12.50` and `$1,299.00`.
    pub fn parse_price(&self, name: &str) -> Result<f64> {
        let raw = self.require(name)?;
        let cleaned: String = raw
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',')
            .collect();
        match cleaned.trim().parse::<f64>() {
            Ok(price) if price.is_finite() => Ok(price),
            _ => Err(self.invalid(name, raw)),
        }
    }

    fn invalid(&self, name: &str, value: &str) -> Error {
        Error::InvalidField {
            field: name.to_string(),
            value: value.to_string(),
            row: self.row_number,
        }
    }
}

/// Header plus data rows of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl CsvTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CsvRow> {
        self.rows.iter()
    }
}

/// Read `path` with the default configuration.
pub fn read_csv(path: &Path) -> Result<CsvTable> {
    read_csv_with(path, &CsvConfig::default())
}

pub fn read_csv_with(path: &Path, config: &CsvConfig) -> Result<CsvTable> {
    let file = File::open(path)?;
    let table = read_from(BufReader::new(file), config)?;
    debug!(path = %path.display(), rows = table.len(), "Read CSV file");
    Ok(table)
}

fn read_from<R: Read>(reader: R, config: &CsvConfig) -> Result<CsvTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote_char)
        .comment(config.comment_char)
        .has_headers(true)
        .flexible(true)
        .trim(if config.trim_whitespace {
            Trim::All
        } else {
            Trim::None
        })
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        rows.push(to_row(&headers, &record, rows.len() + 1));
    }

    Ok(CsvTable { headers, rows })
}

/// Short records are padded with empty values, long ones truncated.
fn to_row(headers: &[String], record: &StringRecord, row_number: usize) -> CsvRow {
    let fields = headers
        .iter()
        .enumerate()
        .map(|(i, header)| (header.clone(), record.get(i).unwrap_or("").to_string()))
        .collect();
    CsvRow { row_number, fields }
}
