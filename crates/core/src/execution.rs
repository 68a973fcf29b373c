//! Normalization of durable execution resources.
//!
//! An execution resource (as returned by `GET /executions/{id}`) carries
//! its own lifecycle status and a nested per-step run trace. This module
//! maps that lifecycle onto [`RunState`](crate::status::RunState) and
//! digs the final output out of the trace.
//!
//! Expected shape (fields not listed are ignored):
//!
//! ```json
//! {
//!   "id": "1042",
//!   "finished": true,
//!   "status": "success",
//!   "customData": { "result": "...", "progress": "0.5" },
//!   "workflowData": { "nodes": [ { "name": "Webhook" }, { "name": "Reply" } ] },
//!   "data": {
//!     "resultData": {
//!       "lastNodeExecuted": "Reply",
//!       "runData": {
//!         "Reply": [ { "data": { "main": [ [ { "json": { "answer": 42 } } ] ] } } ]
//!       },
//!       "error": { "message": "..." }
//!     }
//!   }
//! }
//! ```

use serde_json::Value;

use crate::status::{normalize_progress, StatusRecord};

/// Message attached to executions that were cancelled remotely.
pub const CANCELED_MESSAGE: &str = "Execution was canceled";

/// Fallback message when a failed execution carries no error details.
pub const DEFAULT_EXECUTION_ERROR: &str = "Execution failed";

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Lifecycle status reported by the execution resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    New,
    Running,
    Waiting,
    Success,
    Error,
    Crashed,
    Canceled,
    Unknown(String),
}

impl ExecutionStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => ExecutionStatus::New,
            "running" => ExecutionStatus::Running,
            "waiting" => ExecutionStatus::Waiting,
            "success" => ExecutionStatus::Success,
            "error" => ExecutionStatus::Error,
            "crashed" => ExecutionStatus::Crashed,
            "canceled" | "cancelled" => ExecutionStatus::Canceled,
            other => ExecutionStatus::Unknown(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Translate an execution resource into a [`StatusRecord`].
///
/// `success` completes with the extracted output; `error` and `crashed`
/// fail with the trace's error message; `canceled` fails with
/// [`CANCELED_MESSAGE`]. `new`, `running` and `waiting` are still
/// running. An unknown status falls back to the `finished` flag.
pub fn normalize_execution(resource: &Value) -> StatusRecord {
    let status = resource
        .get("status")
        .and_then(Value::as_str)
        .map(ExecutionStatus::parse)
        .unwrap_or_else(|| ExecutionStatus::Unknown(String::new()));
    let finished = resource
        .get("finished")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match status {
        ExecutionStatus::Success => StatusRecord::complete(extract_output(resource)),
        ExecutionStatus::Error | ExecutionStatus::Crashed => {
            StatusRecord::error(extract_error_message(resource))
        }
        ExecutionStatus::Canceled => StatusRecord::error(CANCELED_MESSAGE),
        ExecutionStatus::New | ExecutionStatus::Running | ExecutionStatus::Waiting => {
            StatusRecord::running(extract_progress(resource))
        }
        ExecutionStatus::Unknown(_) if finished => {
            StatusRecord::complete(extract_output(resource))
        }
        ExecutionStatus::Unknown(_) => StatusRecord::running(extract_progress(resource)),
    }
}

/// Final output of the execution.
///
/// Prefers an explicit `customData.result` override (JSON-decoded when it
/// is a string holding JSON). Otherwise takes the last run of the last
/// executed step and unwraps its items: one item yields its `json` value
/// directly, several yield an array, none yields `null`.
pub fn extract_output(resource: &Value) -> Value {
    if let Some(custom) = resource.pointer("/customData/result") {
        return decode_custom_value(custom);
    }

    let Some(run_data) = resource
        .pointer("/data/resultData/runData")
        .and_then(Value::as_object)
    else {
        return Value::Null;
    };

    let last_node = resource
        .pointer("/data/resultData/lastNodeExecuted")
        .and_then(Value::as_str)
        .filter(|name| run_data.contains_key(*name))
        .or_else(|| run_data.keys().last().map(String::as_str));

    let Some(runs) = last_node
        .and_then(|name| run_data.get(name))
        .and_then(Value::as_array)
    else {
        return Value::Null;
    };

    let items: Vec<Value> = runs
        .last()
        .and_then(|run| run.pointer("/data/main"))
        .and_then(Value::as_array)
        .and_then(|branches| {
            branches
                .iter()
                .filter_map(Value::as_array)
                .find(|items| !items.is_empty())
        })
        .map(|items| items.iter().map(unwrap_item).collect())
        .unwrap_or_default();

    match items.len() {
        0 => Value::Null,
        1 => items.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(items),
    }
}

/// Human-readable failure reason for an errored execution.
pub fn extract_error_message(resource: &Value) -> String {
    let error = resource.pointer("/data/resultData/error");
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(|e| e.get("description")).and_then(Value::as_str))
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or(DEFAULT_EXECUTION_ERROR)
        .to_string()
}

/// Progress of a running execution.
///
/// Uses `customData.progress` when numeric, otherwise the share of
/// workflow nodes that already appear in the run trace.
pub fn extract_progress(resource: &Value) -> Option<f64> {
    if let Some(custom) = resource.pointer("/customData/progress") {
        let raw = match custom {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(fraction) = raw.and_then(normalize_progress) {
            return Some(fraction);
        }
    }

    let executed = resource
        .pointer("/data/resultData/runData")
        .and_then(Value::as_object)?
        .len();
    let total = resource
        .pointer("/workflowData/nodes")
        .and_then(Value::as_array)?
        .len();
    if total == 0 {
        return None;
    }
    Some((executed as f64 / total as f64).clamp(0.0, 1.0))
}

fn unwrap_item(item: &Value) -> Value {
    item.get("json").cloned().unwrap_or_else(|| item.clone())
}

fn decode_custom_value(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}
