use serde_json::{Map, Value};

use super::models::{AssociatedObject, EphemeralKey};
use crate::error::KeyParseError;

/// key: ephemeral-key-parser
/// Parses the raw body returned by a provider. Only `expires` is mandatory; the remaining
/// fields are read when present.
pub fn parse_ephemeral_key(raw: &str) -> Result<EphemeralKey, KeyParseError> {
    let object = parse_object(raw)?;

    let expires = required_i64(&object, "expires")?;
    let id = optional_string(&object, "id")?.unwrap_or_default();
    let secret = optional_string(&object, "secret")?.unwrap_or_default();
    let created = optional_i64(&object, "created")?;
    let livemode = optional_bool(&object, "livemode")?.unwrap_or(false);
    let associated_objects = associated_objects(&object)?;

    Ok(EphemeralKey {
        id,
        created,
        expires,
        livemode,
        secret,
        associated_objects,
        raw: raw.to_string(),
    })
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, KeyParseError> {
    if raw.trim().is_empty() {
        return Err(end_of_input(raw));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(not_an_object(raw, json_type(&other))),
        Err(err) if err.is_eof() => Err(end_of_input(raw)),
        Err(err) => {
            let trimmed = raw.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                Err(KeyParseError::new(format!("Malformed JSON: {err}")))
            } else {
                // Bare text is read as an unquoted string literal.
                Err(not_an_object(raw, "string"))
            }
        }
    }
}

fn end_of_input(raw: &str) -> KeyParseError {
    KeyParseError::new(format!(
        "End of input at character {} of {raw}",
        raw.chars().count()
    ))
}

fn not_an_object(raw: &str, kind: &str) -> KeyParseError {
    KeyParseError::new(format!(
        "Value {raw} of type {kind} cannot be converted to an object"
    ))
}

fn mismatch(field: &str, value: &Value, target: &str) -> KeyParseError {
    KeyParseError::new(format!(
        "Value {value} at {field} of type {} cannot be converted to {target}",
        json_type(value)
    ))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite())
                    .map(|float| float as i64)
            })
        }
        _ => None,
    }
}

fn required_i64(object: &Map<String, Value>, field: &str) -> Result<i64, KeyParseError> {
    let value = object
        .get(field)
        .ok_or_else(|| KeyParseError::new(format!("No value for {field}")))?;
    as_i64(value).ok_or_else(|| mismatch(field, value, "a number"))
}

fn optional_i64(object: &Map<String, Value>, field: &str) -> Result<Option<i64>, KeyParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_i64(value)
            .map(Some)
            .ok_or_else(|| mismatch(field, value, "a number")),
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, KeyParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(scalar.to_string())),
        Some(value) => Err(mismatch(field, value, "a string")),
    }
}

fn optional_bool(object: &Map<String, Value>, field: &str) -> Result<Option<bool>, KeyParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(Value::String(text)) if text.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(text)) if text.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(value) => Err(mismatch(field, value, "a boolean")),
    }
}

fn associated_objects(object: &Map<String, Value>) -> Result<Vec<AssociatedObject>, KeyParseError> {
    let entries = match object.get("associated_objects") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(value) => return Err(mismatch("associated_objects", value, "an array")),
    };
    entries
        .iter()
        .map(|entry| {
            serde_json::from_value::<AssociatedObject>(entry.clone()).map_err(|err| {
                KeyParseError::new(format!("Invalid associated object {entry}: {err}"))
            })
        })
        .collect()
}
