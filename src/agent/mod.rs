//! Question-answering agent port
//!
//! The agent turns a natural-language question into SQL, runs it through
//! the [`SqlToolkit`] against a read-only session store, and answers in
//! prose. Its tool invocations are returned as an ordered, typed trace.
//!
//! # Implementations
//!
//! - [`ChatAgent`]: drives an OpenAI-compatible chat completions API with
//!   native tool calling
//! - [`ScriptedAgent`]: replays a fixed list of tool calls, for tests and
//!   offline use

use serde::{Deserialize, Serialize};

use crate::reader::SqliteReader;
use crate::Result;

pub mod chat;
pub mod scripted;
pub mod toolkit;

pub use chat::ChatAgent;
pub use scripted::{ScriptedAgent, ScriptedCall};
pub use toolkit::{SqlToolkit, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL};

/// One tool invocation made by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Tool name, e.g. `sql_db_query`
    pub tool: String,
    /// Tool input; the SQL text for query calls
    pub input: String,
    /// Tool output as reported back to the model
    pub output: String,
}

/// Final answer plus the ordered tool trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub answer: String,
    pub trace: Vec<TraceStep>,
}

/// Answers questions over a read-only session store
pub trait Agent: Send + Sync {
    /// Answer `question`, asking for at most `top_k` rows per query unless
    /// the question says otherwise
    ///
    /// # Errors
    ///
    /// Returns `SheetSqlError::AgentExecutionFailure` if the agent cannot
    /// produce an answer. Failing SQL statements are not errors; they are
    /// reported to the model as tool output.
    fn run(&self, db: &SqliteReader, question: &str, top_k: usize) -> Result<AgentOutput>;
}
