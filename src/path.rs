//! Dotted-path extraction from nested messages.
//!
//! Paths index nested objects segment by segment; `"a.b.c"` resolves
//! `message["a"]["b"]["c"]`. A missing key can be skipped per the caller's
//! policy, but traversing through a non-object is always a hard error.

use serde_json::{Number, Value};

use crate::mapping::{Mapping, ValueType};

/// Resolve a dotted path against a nested message.
pub fn get_value<'a>(message: &'a Value, path: &str) -> Result<&'a Value, MappingError> {
    let mut current = message;

    for segment in path.split('.') {
        match current {
            Value::Object(fields) => match fields.get(segment) {
                Some(value) => current = value,
                None => {
                    return Err(MappingError::KeyMissing {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            },
            _ => {
                return Err(MappingError::NotAnObject {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        }
    }

    Ok(current)
}

/// Extract one mapping group from a message.
///
/// Returns the pairs in the group's declaration order. When `ignore_missing`
/// is set a missing key drops that single entry; any other failure aborts
/// the group.
pub fn extract_group(
    mappings: &[Mapping],
    message: &Value,
    ignore_missing: bool,
) -> Result<Vec<(String, Value)>, MappingError> {
    let mut fields = Vec::with_capacity(mappings.len());

    for mapping in mappings {
        let raw = match get_value(message, &mapping.src_path) {
            Ok(value) => value,
            Err(MappingError::KeyMissing { .. }) if ignore_missing => continue,
            Err(err) => return Err(err),
        };

        let value = match mapping.value_type {
            Some(value_type) => coerce(raw, value_type, &mapping.src_path)?,
            None => raw.clone(),
        };

        fields.push((mapping.dst_path.clone(), value));
    }

    Ok(fields)
}

/// Apply one coercion from the fixed table.
fn coerce(raw: &Value, value_type: ValueType, path: &str) -> Result<Value, MappingError> {
    let coerced = match value_type {
        ValueType::Int => coerce_int(raw),
        ValueType::Float => coerce_float(raw),
        ValueType::String => match raw {
            Value::String(text) => Some(Value::String(text.clone())),
            Value::Number(number) => Some(Value::String(number.to_string())),
            Value::Bool(flag) => Some(Value::String(flag.to_string())),
            _ => None,
        },
        ValueType::Bool => Some(Value::Bool(truthy(raw))),
        ValueType::StringJson => Some(Value::String(raw.to_string())),
    };

    coerced.ok_or_else(|| MappingError::Coercion {
        path: path.to_string(),
        value_type,
        value: raw.to_string(),
    })
}

fn coerce_int(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(Value::from(int))
            } else {
                number.as_f64().and_then(float_to_int)
            }
        }
        Value::String(text) => match text.parse::<i64>() {
            Ok(int) => Some(Value::from(int)),
            Err(_) => text.parse::<f64>().ok().and_then(float_to_int),
        },
        Value::Bool(flag) => Some(Value::from(*flag as i64)),
        _ => None,
    }
}

fn float_to_int(float: f64) -> Option<Value> {
    let truncated = float.trunc();
    // i64::MAX rounds up to 2^63 as f64, so strictly-less keeps the cast exact.
    if truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Some(Value::from(truncated as i64))
    } else {
        None
    }
}

fn coerce_float(raw: &Value) -> Option<Value> {
    let float = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    };

    float.and_then(Number::from_f64).map(Value::Number)
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Extraction failure for a single mapping group.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("message has no value at '{path}' (missing key '{segment}')")]
    KeyMissing { path: String, segment: String },

    #[error("cannot traverse '{path}': value at '{segment}' is not an object")]
    NotAnObject { path: String, segment: String },

    #[error("cannot coerce value at '{path}' to {value_type}: {value}")]
    Coercion {
        path: String,
        value_type: ValueType,
        value: String,
    },
}
