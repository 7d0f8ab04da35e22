//! SQLite-backed session store

use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

use super::Reader;
use crate::naming::dedup_column_names;
use crate::{Result, SheetSqlError};

/// Raw result rows, each cell keeping its own SQLite storage class
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Reader over one session's SQLite file
pub struct SqliteReader {
    conn: Connection,
    path: PathBuf,
    read_only: bool,
}

impl SqliteReader {
    /// Open (creating if needed) a store for ingestion
    pub fn open_read_write(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            SheetSqlError::ReaderError(format!(
                "Failed to open store {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            read_only: false,
        })
    }

    /// Open an existing store for querying.
    ///
    /// The connection itself is read-only: SQLite rejects any statement that
    /// would modify the file, whatever issued it.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            SheetSqlError::ReaderError(format!(
                "Failed to open store {} read-only: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            read_only: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// User tables in the store, sorted by name
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(|e| SheetSqlError::ReaderError(format!("Failed to list tables: {}", e)))?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| SheetSqlError::ReaderError(format!("Failed to list tables: {}", e)))?;

        Ok(names)
    }

    /// Execute `sql` and return its rows without coercing cells to a column type
    pub fn query_rows(&self, sql: &str) -> Result<QueryRows> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SheetSqlError::ReaderError(format!("Failed to prepare query: {}", e)))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt
            .query([])
            .map_err(|e| SheetSqlError::ReaderError(format!("Failed to execute query: {}", e)))?;
        while let Some(row) = cursor
            .next()
            .map_err(|e| SheetSqlError::ReaderError(format!("Failed to execute query: {}", e)))?
        {
            let values = (0..width)
                .map(|idx| {
                    row.get::<_, Value>(idx).map_err(|e| {
                        SheetSqlError::ReaderError(format!("Failed to read column {}: {}", idx, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }

        Ok(QueryRows { columns, rows })
    }

    /// The `CREATE TABLE` statement stored for `name`, if the table exists
    pub fn table_schema(&self, name: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| {
                SheetSqlError::ReaderError(format!("Failed to read schema of '{}': {}", name, e))
            })
    }
}

impl Reader for SqliteReader {
    fn execute_sql(&self, sql: &str) -> Result<DataFrame> {
        let QueryRows { columns: names, rows } = self.query_rows(sql)?;

        let mut values: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for row in rows {
            for (column, value) in values.iter_mut().zip(row) {
                column.push(value);
            }
        }

        let columns: Vec<Column> = dedup_column_names(names)
            .into_iter()
            .zip(values)
            .map(|(name, column)| values_to_column(&name, column))
            .collect();

        DataFrame::new(columns).map_err(|e| {
            SheetSqlError::ReaderError(format!("Failed to build result frame: {}", e))
        })
    }

    fn register(&mut self, name: &str, df: DataFrame) -> Result<()> {
        if self.read_only {
            return Err(SheetSqlError::ReaderError(format!(
                "Cannot create table '{}': store is read-only",
                name
            )));
        }

        let columns = df.get_columns();
        if columns.is_empty() {
            return Err(SheetSqlError::ReaderError(format!(
                "Cannot create table '{}' without columns",
                name
            )));
        }

        let table = quote_identifier(name);
        let definitions: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(c.name().as_str()), sql_type(c.dtype())))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");

        let tx = self.conn.transaction().map_err(|e| {
            SheetSqlError::ReaderError(format!("Failed to begin transaction: {}", e))
        })?;

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({});",
            definitions.join(", ")
        ))
        .map_err(|e| SheetSqlError::ReaderError(format!("Failed to create table '{}': {}", name, e)))?;

        {
            let mut insert = tx
                .prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))
                .map_err(|e| {
                    SheetSqlError::ReaderError(format!("Failed to prepare insert: {}", e))
                })?;

            for row in 0..df.height() {
                let params = columns
                    .iter()
                    .map(|c| c.get(row).map(any_value_to_sql))
                    .collect::<PolarsResult<Vec<Value>>>()
                    .map_err(|e| {
                        SheetSqlError::ReaderError(format!("Failed to read row {}: {}", row, e))
                    })?;
                insert
                    .execute(rusqlite::params_from_iter(params.iter()))
                    .map_err(|e| {
                        SheetSqlError::ReaderError(format!(
                            "Failed to insert into '{}': {}",
                            name, e
                        ))
                    })?;
            }
        }

        tx.commit()
            .map_err(|e| SheetSqlError::ReaderError(format!("Failed to commit '{}': {}", name, e)))
    }

    fn supports_register(&self) -> bool {
        !self.read_only
    }
}

/// Quote an identifier for SQLite
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite column type for a Polars dtype
fn sql_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        DataType::Date | DataType::Datetime(_, _) => "TIMESTAMP",
        _ => "TEXT",
    }
}

/// Convert a single Polars value to a SQLite value
fn any_value_to_sql(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Integer(b as i64),
        AnyValue::Int8(v) => Value::Integer(v.into()),
        AnyValue::Int16(v) => Value::Integer(v.into()),
        AnyValue::Int32(v) => Value::Integer(v.into()),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt8(v) => Value::Integer(v.into()),
        AnyValue::UInt16(v) => Value::Integer(v.into()),
        AnyValue::UInt32(v) => Value::Integer(v.into()),
        AnyValue::UInt64(v) => match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Real(v as f64),
        },
        AnyValue::Float32(v) if v.is_nan() => Value::Null,
        AnyValue::Float32(v) => Value::Real(v.into()),
        AnyValue::Float64(v) if v.is_nan() => Value::Null,
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::String(s) => Value::Text(s.to_string()),
        AnyValue::StringOwned(s) => Value::Text(s.to_string()),
        AnyValue::Date(days) => {
            let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days.into())));
            match date {
                Some(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
                None => Value::Null,
            }
        }
        AnyValue::Datetime(ts, unit, _) => {
            let dt = match unit {
                TimeUnit::Nanoseconds => Some(chrono::DateTime::from_timestamp_nanos(ts)),
                TimeUnit::Microseconds => chrono::DateTime::from_timestamp_micros(ts),
                TimeUnit::Milliseconds => chrono::DateTime::from_timestamp_millis(ts),
            };
            match dt {
                Some(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                None => Value::Null,
            }
        }
        other => {
            tracing::debug!("Storing unsupported Polars type as text: {:?}", other);
            Value::Text(format!("{}", other))
        }
    }
}

/// Build a result column, inferring its type from SQLite storage classes
fn values_to_column(name: &str, values: Vec<Value>) -> Column {
    let name = PlSmallStr::from(name);

    let all_integer = values
        .iter()
        .all(|v| matches!(v, Value::Null | Value::Integer(_)));
    let all_numeric = values
        .iter()
        .all(|v| matches!(v, Value::Null | Value::Integer(_) | Value::Real(_)));

    let series = if all_integer {
        let data: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        Series::new(name, data)
    } else if all_numeric {
        let data: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Some(*i as f64),
                Value::Real(f) => Some(*f),
                _ => None,
            })
            .collect();
        Series::new(name, data)
    } else {
        let data: Vec<Option<String>> = values
            .into_iter()
            .map(|v| match v {
                Value::Null => None,
                Value::Integer(i) => Some(i.to_string()),
                Value::Real(f) => Some(f.to_string()),
                Value::Text(s) => Some(s),
                Value::Blob(b) => Some(format!("<{} bytes>", b.len())),
            })
            .collect();
        Series::new(name, data)
    };

    Column::from(series)
}
