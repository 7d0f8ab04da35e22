//! Chat-completions SQL agent
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint using native
//! tool calling. Each round trip either requests tool calls, which are run
//! through the [`SqlToolkit`] and fed back, or ends with the final answer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::toolkit::{SqlToolkit, QUERY_TOOL, SCHEMA_TOOL};
use super::{Agent, AgentOutput, TraceStep};
use crate::config::AgentConfig;
use crate::reader::SqliteReader;
use crate::{Result, SheetSqlError};

/// Answer returned when the model keeps calling tools past the iteration cap
pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit.";

/// LLM-backed SQL agent
pub struct ChatAgent {
    config: AgentConfig,
    http: ureq::Agent,
}

impl ChatAgent {
    pub fn new(config: AgentConfig) -> Self {
        let http: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(config.timeout)
            .build()
            .into();
        Self { config, http }
    }

    fn complete(&self, messages: &[Value]) -> Result<ChatMessage> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "tools": SqlToolkit::definitions(),
            "temperature": 0,
        });

        let mut request = self.http.post(&url);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let mut response = request.send_json(&body).map_err(|e| {
            SheetSqlError::AgentExecutionFailure(format!("Request to {} failed: {}", url, e))
        })?;
        let parsed: ChatResponse = response.body_mut().read_json().map_err(|e| {
            SheetSqlError::AgentExecutionFailure(format!("Invalid model response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| {
                SheetSqlError::AgentExecutionFailure("Model returned no choices".to_string())
            })
    }
}

impl Agent for ChatAgent {
    fn run(&self, db: &SqliteReader, question: &str, top_k: usize) -> Result<AgentOutput> {
        let toolkit = SqlToolkit::new(db);
        let mut messages = vec![
            json!({"role": "system", "content": system_prompt(top_k)}),
            json!({"role": "user", "content": question}),
        ];
        let mut trace = Vec::new();

        for iteration in 0..self.config.max_iterations {
            let message = self.complete(&messages)?;
            let calls = message.tool_calls.clone().unwrap_or_default();

            if calls.is_empty() {
                info!(
                    "Agent answered after {} round trip(s), {} tool call(s)",
                    iteration + 1,
                    trace.len()
                );
                return Ok(AgentOutput {
                    answer: message.content.unwrap_or_default(),
                    trace,
                });
            }

            messages.push(serde_json::to_value(&message).map_err(|e| {
                SheetSqlError::InternalError(format!("Failed to encode message: {}", e))
            })?);

            for call in calls {
                let input = tool_input(&call.function.name, &call.function.arguments);
                debug!("Tool call {}: {}", call.function.name, input);
                let output = toolkit.invoke(&call.function.name, &input);

                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": output,
                }));
                trace.push(TraceStep {
                    tool: call.function.name,
                    input,
                    output,
                });
            }
        }

        warn!(
            "Agent hit the iteration limit ({}) without answering",
            self.config.max_iterations
        );
        Ok(AgentOutput {
            answer: ITERATION_LIMIT_ANSWER.to_string(),
            trace,
        })
    }
}

fn system_prompt(top_k: usize) -> String {
    format!(
        "You answer questions about a SQLite database.\n\
         Given a question, write a syntactically correct SQLite query, run it, \
         read the result and answer in plain language.\n\
         Unless the question asks for a specific number of rows, limit every query \
         to at most {top_k} results, ordered by a relevant column.\n\
         Select only the columns the question needs; do not select all columns of a table.\n\
         Look up the available tables with sql_db_list_tables and their columns with \
         sql_db_schema before writing a query.\n\
         If a query fails, correct it and run it again.\n\
         Never run INSERT, UPDATE, DELETE, DROP, ALTER or any other statement that \
         changes the database.\n\
         If the data cannot answer the question, say so."
    )
}

/// Extract the string input of a tool call from its JSON arguments
fn tool_input(tool: &str, arguments: &str) -> String {
    let key = match tool {
        QUERY_TOOL => "query",
        SCHEMA_TOOL => "table_names",
        _ => return String::new(),
    };

    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => match map.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        _ => arguments.to_string(),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}
