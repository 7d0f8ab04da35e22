//! Agent trace normalization
//!
//! Pulls the executed SQL and the first tabular query result out of an agent
//! trace. Row extraction is best effort: anything that does not look like a
//! list of rows degrades to `rows: None`.

use serde_json::{Map, Value};
use tracing::warn;

use crate::agent::{TraceStep, QUERY_TOOL};
use crate::literal::parse_literal;

/// A record keyed by column name
pub type Record = Map<String, Value>;

/// Structured view of an agent trace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Inputs of every query tool call, in execution order
    pub sql_statements: Vec<String>,
    /// Rows of the first list-shaped query result
    pub rows: Option<Vec<Record>>,
}

/// Normalize an agent trace. Never fails.
pub fn normalize(trace: &[TraceStep]) -> Normalized {
    let query_steps: Vec<&TraceStep> = trace.iter().filter(|s| s.tool == QUERY_TOOL).collect();

    let sql_statements = query_steps.iter().map(|s| s.input.clone()).collect();

    let rows = query_steps
        .iter()
        .find(|s| s.output.trim_start().starts_with('['))
        .and_then(|s| rows_from_output(&s.output));

    Normalized {
        sql_statements,
        rows,
    }
}

fn rows_from_output(output: &str) -> Option<Vec<Record>> {
    let parsed = match parse_literal(output) {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not parse query result as rows: {}", e);
            return None;
        }
    };

    let Value::Array(items) = parsed else {
        return None;
    };

    match items.first() {
        None => Some(Vec::new()),
        Some(Value::Array(first)) => {
            let names = column_names(first.len());
            items
                .into_iter()
                .map(|item| match item {
                    Value::Array(values) => Some(positional_record(&names, values)),
                    _ => None,
                })
                .collect()
        }
        Some(Value::Object(_)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Some(_) => None,
    }
}

/// `col_1..col_N`
fn column_names(width: usize) -> Vec<String> {
    (1..=width).map(|idx| format!("col_{}", idx)).collect()
}

/// Name positional values after the first row's columns; extra values are dropped
fn positional_record(names: &[String], values: Vec<Value>) -> Record {
    names.iter().cloned().zip(values).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{LIST_TABLES_TOOL, SCHEMA_TOOL};
    use serde_json::json;

    fn step(tool: &str, input: &str, output: &str) -> TraceStep {
        TraceStep {
            tool: tool.to_string(),
            input: input.to_string(),
            output: output.to_string(),
        }
    }

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_tuples_become_named_records() {
        let trace = vec![step(QUERY_TOOL, "SELECT id, name FROM t", r#"[(1, "a"), (2, "b")]"#)];
        let normalized = normalize(&trace);

        assert_eq!(normalized.sql_statements, vec!["SELECT id, name FROM t"]);
        assert_eq!(
            normalized.rows.unwrap(),
            records(json!([
                {"col_1": 1, "col_2": "a"},
                {"col_1": 2, "col_2": "b"}
            ]))
        );
    }

    #[test]
    fn test_no_list_output_keeps_statements() {
        let trace = vec![
            step(LIST_TABLES_TOOL, "", "sales"),
            step(QUERY_TOOL, "SELECT nope FROM sales", "Error: no such column: nope"),
        ];
        let normalized = normalize(&trace);
        assert_eq!(normalized.sql_statements, vec!["SELECT nope FROM sales"]);
        assert_eq!(normalized.rows, None);
    }

    #[test]
    fn test_empty_trace() {
        assert_eq!(normalize(&[]), Normalized::default());
    }

    #[test]
    fn test_statements_keep_order_and_duplicates() {
        let trace = vec![
            step(QUERY_TOOL, "SELECT 1", "[(1,)]"),
            step(SCHEMA_TOOL, "t", "CREATE TABLE t (x INTEGER)"),
            step(QUERY_TOOL, "SELECT 2", "[(2,)]"),
            step(QUERY_TOOL, "SELECT 1", "[(1,)]"),
        ];
        let normalized = normalize(&trace);
        assert_eq!(
            normalized.sql_statements,
            vec!["SELECT 1", "SELECT 2", "SELECT 1"]
        );
        assert_eq!(normalized.rows.unwrap(), records(json!([{"col_1": 1}])));
    }

    #[test]
    fn test_first_list_result_wins() {
        let trace = vec![
            step(QUERY_TOOL, "SELECT bad", "Error: syntax error"),
            step(QUERY_TOOL, "SELECT a FROM t", "[('first',)]"),
            step(QUERY_TOOL, "SELECT b FROM t", "[('second',)]"),
        ];
        let rows = normalize(&trace).rows.unwrap();
        assert_eq!(rows, records(json!([{"col_1": "first"}])));
    }

    #[test]
    fn test_only_query_tool_output_is_considered() {
        let trace = vec![
            step(SCHEMA_TOOL, "t", "[('not', 'rows')]"),
            step(QUERY_TOOL, "SELECT 1", "Error: oops"),
        ];
        assert_eq!(normalize(&trace).rows, None);
    }

    #[test]
    fn test_unparseable_output_degrades_to_none() {
        let trace = vec![step(QUERY_TOOL, "SELECT d", "[(datetime.date(2024, 1, 1),)]")];
        let normalized = normalize(&trace);
        assert_eq!(normalized.sql_statements.len(), 1);
        assert_eq!(normalized.rows, None);
    }

    #[test]
    fn test_first_row_sets_column_count() {
        let wider = vec![step(QUERY_TOOL, "q", "[(1,), (2, 3)]")];
        assert_eq!(
            normalize(&wider).rows.unwrap(),
            records(json!([{"col_1": 1}, {"col_1": 2}]))
        );

        let narrower = vec![step(QUERY_TOOL, "q", "[(1, 'a'), (2,)]")];
        assert_eq!(
            normalize(&narrower).rows.unwrap(),
            records(json!([{"col_1": 1, "col_2": "a"}, {"col_1": 2}]))
        );
    }

    #[test]
    fn test_mapping_rows_pass_through() {
        let trace = vec![step(QUERY_TOOL, "q", "[{'region': 'EU', 'total': 2.5}]")];
        assert_eq!(
            normalize(&trace).rows.unwrap(),
            records(json!([{"region": "EU", "total": 2.5}]))
        );
    }

    #[test]
    fn test_non_row_shapes() {
        let scalars = vec![step(QUERY_TOOL, "q", "[1, 2, 3]")];
        assert_eq!(normalize(&scalars).rows, None);

        let mixed = vec![step(QUERY_TOOL, "q", "[(1,), 2]")];
        assert_eq!(normalize(&mixed).rows, None);

        let empty = vec![step(QUERY_TOOL, "q", "[]")];
        assert_eq!(normalize(&empty).rows, Some(Vec::new()));
    }

    #[test]
    fn test_leading_whitespace_and_nulls() {
        let trace = vec![step(QUERY_TOOL, "q", "  [(None, True, 1.5)]\n")];
        assert_eq!(
            normalize(&trace).rows.unwrap(),
            records(json!([{"col_1": null, "col_2": true, "col_3": 1.5}]))
        );
    }
}
