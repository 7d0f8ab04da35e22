//! Tabular upload parsing
//!
//! Turns an uploaded file into one or more named sheets, each a Polars
//! DataFrame with inferred column types. CSV files yield a single sheet
//! named after the file stem; workbooks yield one sheet per worksheet, in
//! workbook order.

use std::path::Path;

use crate::{DataFrame, Result};

pub mod csv;
pub mod workbook;

/// File extensions accepted for upload
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xls", "xlsx"];

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Comma-separated values, single sheet
    Csv,
    /// Spreadsheet workbook, one sheet per worksheet
    Workbook,
}

impl SourceFormat {
    /// Detect the format from a filename's extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "xls" | "xlsx" => Some(SourceFormat::Workbook),
            _ => None,
        }
    }
}

/// One parsed sheet, before its name is sanitized
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub frame: DataFrame,
}

/// Parse the file at `path` into sheets.
///
/// `stem` names the single sheet of a CSV file.
pub fn read_sheets(format: SourceFormat, path: &Path, stem: &str) -> Result<Vec<Sheet>> {
    match format {
        SourceFormat::Csv => Ok(vec![Sheet {
            name: stem.to_string(),
            frame: csv::read_csv(path)?,
        }]),
        SourceFormat::Workbook => workbook::read_workbook(path),
    }
}
