//! SQL tools exposed to the agent
//!
//! Every tool takes a string and returns a string. Failures are reported as
//! `Error: <cause>` outputs so the model can correct itself.

use rusqlite::types::Value as SqlValue;
use serde_json::{json, Value};

use crate::reader::sqlite::quote_identifier;
use crate::reader::{QueryRows, SqliteReader};
use crate::Result;

/// Executes a SQL statement and returns the rows
pub const QUERY_TOOL: &str = "sql_db_query";

/// Lists the tables of the store
pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";

/// Describes tables: definition plus sample rows
pub const SCHEMA_TOOL: &str = "sql_db_schema";

/// Sample rows shown per table by the schema tool
const SAMPLE_ROWS: usize = 3;

/// SQL tools bound to one store connection
pub struct SqlToolkit<'a> {
    db: &'a SqliteReader,
}

impl<'a> SqlToolkit<'a> {
    pub fn new(db: &'a SqliteReader) -> Self {
        Self { db }
    }

    /// Run a tool by name. Never fails; errors become `Error: ...` text.
    pub fn invoke(&self, tool: &str, input: &str) -> String {
        let result = match tool {
            QUERY_TOOL => self.query(input),
            LIST_TABLES_TOOL => self.list_tables(),
            SCHEMA_TOOL => self.schema(input),
            other => {
                return format!(
                    "Error: {} is not a valid tool, try one of [{}, {}, {}].",
                    other, QUERY_TOOL, LIST_TABLES_TOOL, SCHEMA_TOOL
                )
            }
        };
        result.unwrap_or_else(|e| format!("Error: {}", e))
    }

    pub fn list_tables(&self) -> Result<String> {
        Ok(self.db.table_names()?.join(", "))
    }

    /// Definition and sample rows for a comma-separated list of tables
    pub fn schema(&self, tables: &str) -> Result<String> {
        let requested: Vec<&str> = tables
            .split(',')
            .map(|t| t.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`'))
            .filter(|t| !t.is_empty())
            .collect();

        let known = self.db.table_names()?;
        let missing: Vec<&str> = requested
            .iter()
            .copied()
            .filter(|t| !known.iter().any(|k| k.as_str() == *t))
            .collect();
        if !missing.is_empty() {
            return Ok(format!(
                "Error: table_names {} not found in database",
                missing.join(", ")
            ));
        }

        let mut sections = Vec::with_capacity(requested.len());
        for table in requested {
            let definition = self.db.table_schema(table)?.unwrap_or_default();
            let sample = self.db.query_rows(&format!(
                "SELECT * FROM {} LIMIT {}",
                quote_identifier(table),
                SAMPLE_ROWS
            ))?;
            sections.push(format!(
                "{}\n\n/*\n{} rows from {} table:\n{}*/",
                definition,
                SAMPLE_ROWS,
                table,
                render_sample(&sample)
            ));
        }
        Ok(sections.join("\n\n"))
    }

    /// Execute `sql` and render its rows as a list of tuples
    pub fn query(&self, sql: &str) -> Result<String> {
        let result = self.db.query_rows(sql)?;
        Ok(render_rows(&result.rows))
    }

    /// Function-calling definitions of the tools, in chat completions format
    pub fn definitions() -> Value {
        json!([
            {
                "type": "function",
                "function": {
                    "name": QUERY_TOOL,
                    "description": "Run one SQLite query and get the resulting rows. \
                        A failing query returns an error message; fix the query and try again. \
                        Check column names with sql_db_schema when unsure.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "A complete, syntactically correct SQLite query"
                            }
                        },
                        "required": ["query"]
                    }
                }
            },
            {
                "type": "function",
                "function": {
                    "name": SCHEMA_TOOL,
                    "description": "Get the definition and sample rows of tables. \
                        Call sql_db_list_tables first to learn which tables exist.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "table_names": {
                                "type": "string",
                                "description": "Comma-separated table names, e.g. 'orders, customers'"
                            }
                        },
                        "required": ["table_names"]
                    }
                }
            },
            {
                "type": "function",
                "function": {
                    "name": LIST_TABLES_TOOL,
                    "description": "List the tables in the database, comma-separated.",
                    "parameters": {
                        "type": "object",
                        "properties": {}
                    }
                }
            }
        ])
    }
}

/// Render rows as `[(v1, v2), ...]`; no rows render as an empty string
pub fn render_rows(rows: &[Vec<SqlValue>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let rendered: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row.iter().map(render_value).collect();
            if values.len() == 1 {
                format!("({},)", values[0])
            } else {
                format!("({})", values.join(", "))
            }
        })
        .collect();

    format!("[{}]", rendered.join(", "))
}

/// Render one cell in its own storage class
fn render_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "None".to_string(),
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) if v.is_finite() => format!("{:?}", v),
        SqlValue::Real(_) => "None".to_string(),
        SqlValue::Text(s) => quote_string(s),
        SqlValue::Blob(b) => format!("b'<{} bytes>'", b.len()),
    }
}

/// Quote a string, preferring single quotes
fn quote_string(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn render_sample(sample: &QueryRows) -> String {
    let mut out = sample.columns.join("\t");
    out.push('\n');

    for row in &sample.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                SqlValue::Null => "None".to_string(),
                SqlValue::Integer(v) => v.to_string(),
                SqlValue::Real(v) => v.to_string(),
                SqlValue::Text(s) => s.clone(),
                SqlValue::Blob(b) => format!("<{} bytes>", b.len()),
            })
            .collect();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out
}
