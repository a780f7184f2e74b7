use crate::error::SubmitError;
use crate::upload::types::ResponsePayload;
use serde_json::Value;

/// Tags a raw endpoint payload. An object with a string `html` property is
/// markup; any other object becomes one row per top-level key, in the order
/// the keys were received. Non-object payloads are a protocol error.
pub fn classify(raw: Value) -> Result<ResponsePayload, SubmitError> {
    match raw {
        Value::Object(mut fields) => {
            if matches!(fields.get("html"), Some(Value::String(_))) {
                if let Some(Value::String(html)) = fields.remove("html") {
                    return Ok(ResponsePayload::Markup(html));
                }
            }
            Ok(ResponsePayload::Tabular(fields.into_iter().collect()))
        }
        other => Err(SubmitError::Protocol(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Parses a response body and classifies it.
pub fn classify_body(body: &[u8]) -> Result<ResponsePayload, SubmitError> {
    let raw: Value = serde_json::from_slice(body)
        .map_err(|e| SubmitError::Protocol(format!("body is not valid JSON: {e}")))?;
    classify(raw)
}

/// Display text for one table cell: objects and arrays as indented JSON,
/// strings unquoted, other scalars in their usual spelling.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn table_rows(fields: &[(String, Value)]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), format_value(value)))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
