//! CSV parsing

use polars::prelude::*;
use std::path::Path;

use crate::{Result, SheetSqlError};

/// Read a CSV file with a header row, inferring column types from all rows
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| SheetSqlError::IngestionFailure(format!("Failed to parse CSV: {}", e)))?;

    if df.width() == 0 {
        return Err(SheetSqlError::IngestionFailure(
            "No columns to parse from file".to_string(),
        ));
    }

    Ok(df)
}
