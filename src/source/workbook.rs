//! Spreadsheet workbook parsing
//!
//! Every worksheet becomes a DataFrame. The first row of a worksheet's used
//! range is the header; the remaining rows are data.

use calamine::{open_workbook_auto, Data, DataType as _, Range, Reader as WorkbookReader};
use polars::prelude::*;
use std::path::Path;
use tracing::warn;

use super::Sheet;
use crate::naming::dedup_column_names;
use crate::{Result, SheetSqlError};

/// Largest float magnitude still treated as an integer cell
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Read every worksheet of a workbook, in workbook order.
///
/// Completely blank worksheets are skipped.
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        SheetSqlError::IngestionFailure(format!("Failed to open workbook: {}", e))
    })?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name).map_err(|e| {
            SheetSqlError::IngestionFailure(format!("Failed to read sheet '{}': {}", name, e))
        })?;

        match range_to_frame(&range)? {
            Some(frame) => sheets.push(Sheet { name, frame }),
            None => warn!("Skipping blank sheet '{}'", name),
        }
    }

    Ok(sheets)
}

/// Convert a worksheet range into a DataFrame, `None` for a blank sheet
pub fn range_to_frame(range: &Range<Data>) -> Result<Option<DataFrame>> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(None);
    };
    if range.used_cells().next().is_none() {
        return Ok(None);
    }

    let body: Vec<&[Data]> = rows.collect();
    let names = dedup_column_names(header_names(header));

    let columns: Vec<Column> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&Data> = body
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Data::Empty))
                .collect();
            cells_to_column(name, &cells)
        })
        .collect();

    DataFrame::new(columns).map(Some).map_err(|e| {
        SheetSqlError::IngestionFailure(format!("Failed to build sheet frame: {}", e))
    })
}

fn header_names(header: &[Data]) -> Vec<String> {
    header
        .iter()
        .enumerate()
        .map(|(idx, cell)| match cell {
            Data::Empty => format!("Unnamed: {}", idx),
            other => cell_to_string(other).unwrap_or_else(|| format!("Unnamed: {}", idx)),
        })
        .collect()
}

fn integral(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => Some(*f as i64),
        _ => None,
    }
}

fn numeric(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        _ => None,
    }
}

/// Build a column, inferring Int64, Float64, Boolean or String in that order
fn cells_to_column(name: &str, cells: &[&Data]) -> Column {
    let name = PlSmallStr::from(name);
    let present = || cells.iter().filter(|c| !matches!(c, Data::Empty));

    let series = if present().all(|c| integral(c).is_some()) {
        let data: Vec<Option<i64>> = cells.iter().map(|c| integral(c)).collect();
        Series::new(name, data)
    } else if present().all(|c| numeric(c).is_some()) {
        let data: Vec<Option<f64>> = cells.iter().map(|c| numeric(c)).collect();
        Series::new(name, data)
    } else if present().all(|c| matches!(c, Data::Bool(_))) {
        let data: Vec<Option<bool>> = cells
            .iter()
            .map(|c| match c {
                Data::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        Series::new(name, data)
    } else {
        let data: Vec<Option<String>> = cells.iter().map(|c| cell_to_string(c)).collect();
        Series::new(name, data)
    };

    Column::from(series)
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => {
            Some((*f as i64).to_string())
        }
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_from(rows: &[Vec<Data>]) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    #[test]
    fn test_range_to_frame_infers_types() {
        let range = range_from(&[
            vec![s("id"), s("product"), s("price"), s("active")],
            vec![Data::Float(1.0), s("Laptop"), Data::Float(999.99), Data::Bool(true)],
            vec![Data::Int(2), s("Mouse"), Data::Float(25.0), Data::Bool(false)],
        ]);

        let df = range_to_frame(&range).unwrap().unwrap();
        assert_eq!(df.shape(), (2, 4));
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("product").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("price").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("active").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn test_range_to_frame_mixed_column_is_text() {
        let range = range_from(&[
            vec![s("code")],
            vec![Data::Float(7.0)],
            vec![s("A-1")],
            vec![Data::Empty],
        ]);

        let df = range_to_frame(&range).unwrap().unwrap();
        let code = df.column("code").unwrap();
        assert_eq!(code.dtype(), &DataType::String);
        assert_eq!(code.get(0).unwrap(), AnyValue::String("7"));
        assert_eq!(code.null_count(), 1);
    }

    #[test]
    fn test_header_blank_and_duplicate_names() {
        let range = range_from(&[
            vec![s("a"), Data::Empty, s("a")],
            vec![Data::Int(1), Data::Int(2), Data::Int(3)],
        ]);

        let df = range_to_frame(&range).unwrap().unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["a", "Unnamed: 1", "a_duplicated_0"]);
    }

    #[test]
    fn test_header_only_sheet() {
        let range = range_from(&[vec![s("x"), s("y")]]);
        let df = range_to_frame(&range).unwrap().unwrap();
        assert_eq!(df.shape(), (0, 2));
    }

    #[test]
    fn test_blank_sheet() {
        let range: Range<Data> = Range::empty();
        assert!(range_to_frame(&range).unwrap().is_none());
    }

    #[test]
    fn test_read_workbook_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.xlsx");

        let mut book = rust_xlsxwriter::Workbook::new();
        let sales = book.add_worksheet().set_name("Q1 Sales").unwrap();
        sales.write_string(0, 0, "region").unwrap();
        sales.write_string(0, 1, "amount").unwrap();
        sales.write_string(1, 0, "US").unwrap();
        sales.write_number(1, 1, 10.0).unwrap();
        sales.write_string(2, 0, "EU").unwrap();
        sales.write_number(2, 1, 20.5).unwrap();
        book.add_worksheet().set_name("Notes").unwrap();
        let targets = book.add_worksheet().set_name("2024 Targets").unwrap();
        targets.write_string(0, 0, "year").unwrap();
        targets.write_number(1, 0, 2024.0).unwrap();
        book.save(&path).unwrap();

        let sheets = read_workbook(&path).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Q1 Sales", "2024 Targets"]);

        assert_eq!(sheets[0].frame.shape(), (2, 2));
        assert_eq!(
            sheets[0].frame.column("amount").unwrap().dtype(),
            &DataType::Float64
        );
        assert_eq!(
            sheets[1].frame.column("year").unwrap().get(0).unwrap(),
            AnyValue::Int64(2024)
        );
    }

    #[test]
    fn test_open_invalid_workbook() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.xlsx");
        std::fs::write(&path, b"definitely not a zip archive").unwrap();

        assert!(matches!(
            read_workbook(&path),
            Err(SheetSqlError::IngestionFailure(_))
        ));
    }
}
