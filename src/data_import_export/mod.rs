//! Data Import Utilities
//!
//! Reads the header-first delimited source files (master data and
//! transactions) into rows addressed by column name.

pub mod csv_handler;

pub use csv_handler::{read_csv, read_csv_with, CsvConfig, CsvRow, CsvTable};
