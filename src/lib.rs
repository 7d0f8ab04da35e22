/*!
# sheetsql - ask questions of uploaded spreadsheets

sheetsql turns an uploaded CSV file or spreadsheet workbook into a
per-session SQLite database and answers natural-language questions about it
by handing a read-only connection to an SQL agent.

## Pipeline

```text
upload ──► source (CSV / workbook → DataFrames)
       ──► naming (sheet / file name → table name)
       ──► reader::SqliteReader (one store per session, replace semantics)

question ──► session registry (id → store path)
         ──► read-only SqliteReader ──► agent (answer + tool trace)
         ──► normalize (SQL statements + first tabular result)
```

## Example

```rust,ignore
use sheetsql::{ingest::Ingestor, session::SessionId};

let ingestor = Ingestor::new(layout, registry);
let report = ingestor.ingest(&SessionId::generate(), "2024 Sales.csv", &bytes)?;
assert_eq!(report.tables, vec!["t_2024_sales"]);
```
*/

pub mod agent;
pub mod config;
pub mod ingest;
pub mod literal;
pub mod naming;
pub mod normalize;
pub mod query;
pub mod reader;
pub mod session;
pub mod source;

pub use agent::{Agent, AgentOutput, TraceStep};
pub use ingest::{IngestReport, Ingestor};
pub use normalize::{normalize, Normalized};
pub use query::{AskOutcome, QueryService};
pub use session::{FsSessionRegistry, SessionId, SessionRegistry};

// Re-export polars types for callers that inspect parsed sheets
pub use polars::prelude::DataFrame;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main library error type
#[derive(thiserror::Error, Debug)]
pub enum SheetSqlError {
    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Error processing file: {0}")]
    IngestionFailure(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Agent execution failed: {0}")]
    AgentExecutionFailure(String),

    #[error("Data source error: {0}")]
    ReaderError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, SheetSqlError>;
