//! Output shapes for extracted fields.
//!
//! Extraction produces an ordered list of `(destination, value)` pairs;
//! a builder decides what the caller actually receives. The default map
//! shape suits most consumers, the list shapes keep duplicates and order.

use serde_json::{Map, Value};

/// Turns an ordered field list into a caller-facing output value.
pub trait ResultBuilder {
    type Output;

    fn build(&self, fields: Vec<(String, Value)>) -> Self::Output;
}

/// JSON object keyed by destination path. Duplicate destinations keep the
/// last extracted value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapBuilder;

impl ResultBuilder for MapBuilder {
    type Output = Map<String, Value>;

    fn build(&self, fields: Vec<(String, Value)>) -> Self::Output {
        fields.into_iter().collect()
    }
}

/// `"destination=value"` strings in extraction order.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringListBuilder;

impl ResultBuilder for StringListBuilder {
    type Output = Vec<String>;

    fn build(&self, fields: Vec<(String, Value)>) -> Self::Output {
        fields
            .into_iter()
            .map(|(dst, value)| format!("{}={}", dst, display(&value)))
            .collect()
    }
}

/// The raw `(destination, value)` pairs, untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairListBuilder;

impl ResultBuilder for PairListBuilder {
    type Output = Vec<(String, Value)>;

    fn build(&self, fields: Vec<(String, Value)>) -> Self::Output {
        fields
    }
}

/// Strings render without quotes, everything else as compact JSON.
fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
