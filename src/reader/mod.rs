//! Relational store access for sheetsql
//!
//! The reader module wraps the per-session SQLite store behind a small
//! interface that speaks Polars DataFrames in both directions.
//!
//! # Architecture
//!
//! All readers implement the `Reader` trait, which provides:
//! - SQL query execution → DataFrame conversion
//! - Optional DataFrame registration as a table (ingestion side only)
//!
//! A session store is opened read-write exactly once, while its upload is
//! ingested. Every later open is read-only and enforced by the engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetsql::reader::{Reader, SqliteReader};
//!
//! let mut writer = SqliteReader::open_read_write(&path)?;
//! writer.register("sales", sales_df)?;
//! drop(writer);
//!
//! let reader = SqliteReader::open_read_only(&path)?;
//! let df = reader.execute_sql("SELECT region, SUM(amount) FROM sales GROUP BY 1")?;
//! ```

use crate::{DataFrame, Result, SheetSqlError};

pub mod sqlite;

pub use sqlite::{QueryRows, SqliteReader};

/// Trait for relational store readers
///
/// Readers execute SQL queries and return Polars DataFrames.
pub trait Reader {
    /// Execute a SQL query and return the result as a DataFrame
    ///
    /// # Errors
    ///
    /// Returns `SheetSqlError::ReaderError` if:
    /// - The SQL is invalid
    /// - The table or columns don't exist
    /// - The statement writes and the store is read-only
    fn execute_sql(&self, sql: &str) -> Result<DataFrame>;

    /// Register a DataFrame as a table, replacing any table of the same name
    ///
    /// # Default Implementation
    ///
    /// Returns an error by default. Override for readers that support registration.
    fn register(&mut self, name: &str, _df: DataFrame) -> Result<()> {
        Err(SheetSqlError::ReaderError(format!(
            "This reader does not support DataFrame registration for table '{}'",
            name
        )))
    }

    /// Check if this reader supports DataFrame registration
    fn supports_register(&self) -> bool {
        false
    }
}
