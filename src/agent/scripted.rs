//! Deterministic agent that replays fixed tool calls

use super::toolkit::SqlToolkit;
use super::{Agent, AgentOutput, TraceStep};
use crate::reader::SqliteReader;
use crate::{Result, SheetSqlError};

/// A tool call to replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub tool: String,
    pub input: String,
}

impl ScriptedCall {
    pub fn new(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            input: input.into(),
        }
    }
}

/// Agent that runs a fixed script against the real toolkit
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    calls: Vec<ScriptedCall>,
    answer: String,
    failure: Option<String>,
}

impl ScriptedAgent {
    pub fn new(calls: Vec<ScriptedCall>, answer: impl Into<String>) -> Self {
        Self {
            calls,
            answer: answer.into(),
            failure: None,
        }
    }

    /// An agent whose every run fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }
}

impl Agent for ScriptedAgent {
    fn run(&self, db: &SqliteReader, _question: &str, _top_k: usize) -> Result<AgentOutput> {
        if let Some(message) = &self.failure {
            return Err(SheetSqlError::AgentExecutionFailure(message.clone()));
        }

        let toolkit = SqlToolkit::new(db);
        let trace = self
            .calls
            .iter()
            .map(|call| TraceStep {
                tool: call.tool.clone(),
                input: call.input.clone(),
                output: toolkit.invoke(&call.tool, &call.input),
            })
            .collect();

        Ok(AgentOutput {
            answer: self.answer.clone(),
            trace,
        })
    }
}
