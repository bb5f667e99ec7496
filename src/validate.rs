use serde_json::Value;

use crate::error::{RelayError, Result};

/// Check that a decoded API response has the expected shape and return the
/// `homeworks` array. The records themselves are not inspected.
pub fn check_response(response: &Value) -> Result<&[Value]> {
    let object = response.as_object().ok_or_else(|| {
        RelayError::TypeMismatch(format!(
            "API response is {} rather than an object",
            json_kind(response)
        ))
    })?;

    let homeworks = object
        .get("homeworks")
        .ok_or_else(|| RelayError::MissingKey("homeworks".to_string()))?;

    match homeworks {
        Value::Array(items) => Ok(items.as_slice()),
        other => Err(RelayError::TypeMismatch(format!(
            "\"homeworks\" is {} rather than a list",
            json_kind(other)
        ))),
    }
}

/// Server-supplied cursor for the next poll, if present and integral.
pub fn current_date(response: &Value) -> Option<i64> {
    response.get("current_date").and_then(Value::as_i64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
