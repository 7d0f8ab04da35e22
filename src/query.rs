//! Question answering over session stores

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{Agent, AgentOutput};
use crate::normalize::{normalize, Record};
use crate::reader::SqliteReader;
use crate::session::SessionRegistry;
use crate::{Result, SheetSqlError};

/// Default row hint passed to the agent
pub const DEFAULT_TOP_K: usize = 5;

/// Table names in the store of `session_id`, opened read-only. Needs no agent.
pub fn list_tables(registry: &dyn SessionRegistry, session_id: &str) -> Result<Vec<String>> {
    let location = registry.resolve(session_id)?;
    SqliteReader::open_read_only(&location.path)?.table_names()
}

/// Answer to a question, with the SQL behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub sql_queries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Record>>,
    pub raw_agent_output: Value,
}

/// Opens session stores read-only and hands them to the agent
pub struct QueryService {
    registry: Arc<dyn SessionRegistry>,
    agent: Arc<dyn Agent>,
}

impl QueryService {
    pub fn new(registry: Arc<dyn SessionRegistry>, agent: Arc<dyn Agent>) -> Self {
        Self { registry, agent }
    }

    fn open(&self, session_id: &str) -> Result<SqliteReader> {
        let location = self.registry.resolve(session_id)?;
        SqliteReader::open_read_only(&location.path)
    }

    /// Run the agent for `question` against the store of `session_id`.
    ///
    /// # Errors
    ///
    /// - `SheetSqlError::SessionNotFound` if the session has no store
    /// - `SheetSqlError::AgentExecutionFailure` if the agent fails
    pub fn answer(&self, session_id: &str, question: &str, top_k: usize) -> Result<AgentOutput> {
        let db = self.open(session_id)?;
        info!("Answering question for session {}", session_id);

        self.agent.run(&db, question, top_k).map_err(|e| {
            warn!("Agent failed for session {}: {}", session_id, e);
            match e {
                SheetSqlError::AgentExecutionFailure(msg) => {
                    SheetSqlError::AgentExecutionFailure(msg)
                }
                other => SheetSqlError::AgentExecutionFailure(other.to_string()),
            }
        })
    }

    /// [`answer`](Self::answer) plus the normalized SQL statements and rows
    pub fn ask(&self, session_id: &str, question: &str, top_k: usize) -> Result<AskOutcome> {
        let output = self.answer(session_id, question, top_k)?;
        let normalized = normalize(&output.trace);

        let steps: Vec<Value> = output
            .trace
            .iter()
            .map(|step| {
                json!({
                    "tool": step.tool,
                    "tool_input": step.input,
                    "output": step.output,
                })
            })
            .collect();

        Ok(AskOutcome {
            raw_agent_output: json!({
                "input": question,
                "output": output.answer,
                "intermediate_steps": steps,
            }),
            answer: output.answer,
            sql_queries: normalized.sql_statements,
            rows: normalized.rows,
        })
    }

    /// Table names in the store of `session_id`
    pub fn tables(&self, session_id: &str) -> Result<Vec<String>> {
        list_tables(self.registry.as_ref(), session_id)
    }
}
