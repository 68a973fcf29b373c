//! Classification of the initial webhook response.
//!
//! The webhook either answers synchronously with the final payload, or
//! acknowledges a long-running operation with an identifier plus a
//! running indicator. [`classify_response`] turns the raw body into an
//! explicit [`Invocation`] so the poll loop never sniffs shapes itself.

use serde_json::Value;

use crate::status::{normalize_progress, StatusRecord};
use crate::types::OperationHandle;

/// Fields that may carry the operation identifier, in priority order.
pub const OPERATION_ID_FIELDS: [&str; 3] = ["executionId", "operationId", "id"];

/// Fields that may carry the status location, in priority order.
pub const STATUS_LOCATION_FIELDS: [&str; 3] = ["statusUrl", "statusLocation", "pollUrl"];

/// Status values that mean "accepted, still working".
const PENDING_STATES: [&str; 6] = ["running", "pending", "waiting", "new", "queued", "started"];

/// Outcome of the single initial request.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The webhook answered with the final result; no polling needed.
    Immediate(Value),
    /// The operation continues remotely and must be tracked.
    Pending {
        handle: OperationHandle,
        initial: StatusRecord,
    },
}

impl Invocation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Invocation::Pending { .. })
    }
}

/// Classify a raw response body.
///
/// Empty bodies become `Immediate(Null)` and non-JSON bodies become
/// `Immediate(String)`. `location_header` is used as the status location
/// when the body names none.
pub fn classify_body(body: &str, location_header: Option<&str>) -> Invocation {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Invocation::Immediate(Value::Null);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => classify_response(value, location_header),
        Err(_) => Invocation::Immediate(Value::String(body.to_string())),
    }
}

/// Classify a parsed JSON response.
///
/// Polling begins only when the object carries both an operation
/// identifier and a running indicator; anything else is the final result.
pub fn classify_response(value: Value, location_header: Option<&str>) -> Invocation {
    let Some(object) = value.as_object() else {
        return Invocation::Immediate(value);
    };

    let operation_id = OPERATION_ID_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(id_to_string));

    let Some(operation_id) = operation_id else {
        return Invocation::Immediate(value);
    };
    if !has_running_indicator(object) {
        return Invocation::Immediate(value);
    }

    let status_location = STATUS_LOCATION_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str).filter(non_blank))
        .or(location_header.filter(non_blank))
        .map(str::to_string);

    let progress = object
        .get("progress")
        .and_then(Value::as_f64)
        .and_then(normalize_progress);

    Invocation::Pending {
        handle: OperationHandle {
            id: operation_id,
            status_location,
        },
        initial: StatusRecord::running(progress),
    }
}

fn has_running_indicator(object: &serde_json::Map<String, Value>) -> bool {
    if object.get("running").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    ["status", "state"].iter().any(|field| {
        object
            .get(*field)
            .and_then(Value::as_str)
            .map(|s| PENDING_STATES.contains(&s.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    })
}

fn non_blank(s: &&str) -> bool {
    !s.trim().is_empty()
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
