//! Parsing of raw mapping tables into extraction plans.
//!
//! A mapping table is a map whose keys encode `<dst_path>:<group>` or
//! `<dst_path>:<value_type>:<group>` and whose values are dotted source
//! paths. Parsing happens once per distinct table hash; every filter
//! sharing that hash reuses the parsed record.

use std::fmt;

use indexmap::IndexMap;

/// Output group a mapping belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingGroup {
    /// Primary extraction output.
    Data,
    /// Secondary extraction output.
    Extra,
}

impl MappingGroup {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "data" => Some(MappingGroup::Data),
            "extra" => Some(MappingGroup::Extra),
            _ => None,
        }
    }
}

impl fmt::Display for MappingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingGroup::Data => f.write_str("data"),
            MappingGroup::Extra => f.write_str("extra"),
        }
    }
}

/// Coercion applied to an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Truncating integer conversion.
    Int,
    /// Floating-point conversion.
    Float,
    /// Display form of a scalar.
    String,
    /// Truthiness of the value.
    Bool,
    /// Compact JSON text of any value.
    StringJson,
}

impl ValueType {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "int" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "string" => Some(ValueType::String),
            "bool" => Some(ValueType::Bool),
            "string_json" => Some(ValueType::StringJson),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::String => f.write_str("string"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::StringJson => f.write_str("string_json"),
        }
    }
}

/// One extraction step: read `src_path` from the message, emit under
/// `dst_path`, optionally coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// Dotted path into the message.
    pub src_path: String,
    /// Destination key in the built output.
    pub dst_path: String,
    /// Optional coercion.
    pub value_type: Option<ValueType>,
}

/// Parsed, deduplicated form of one mapping table.
///
/// Both groups keep the table's declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRecord {
    /// Mappings of the "data" group.
    pub data: Vec<Mapping>,
    /// Mappings of the "extra" group.
    pub extra: Vec<Mapping>,
}

impl MappingRecord {
    /// Mappings of one group.
    pub fn group(&self, group: MappingGroup) -> &[Mapping] {
        match group {
            MappingGroup::Data => &self.data,
            MappingGroup::Extra => &self.extra,
        }
    }
}

/// Parse a raw mapping table into its two-group record.
pub fn parse_mappings(mappings: &IndexMap<String, String>) -> Result<MappingRecord, ParseMappingsError> {
    let mut record = MappingRecord::default();

    for (key, src_path) in mappings {
        let segments: Vec<&str> = key.split(':').collect();
        let (dst_path, value_type, group) = match segments.as_slice() {
            [dst, group] => (*dst, None, *group),
            [dst, value_type, group] => {
                let value_type =
                    ValueType::parse(value_type).ok_or_else(|| ParseMappingsError::UnknownValueType {
                        key: key.clone(),
                        value_type: value_type.to_string(),
                    })?;
                (*dst, Some(value_type), *group)
            }
            _ => return Err(ParseMappingsError::BadKey { key: key.clone() }),
        };

        let group = MappingGroup::parse(group).ok_or_else(|| ParseMappingsError::UnknownGroup {
            key: key.clone(),
            group: group.to_string(),
        })?;

        if dst_path.is_empty() || src_path.is_empty() {
            return Err(ParseMappingsError::EmptyPath { key: key.clone() });
        }

        let mapping = Mapping {
            src_path: src_path.clone(),
            dst_path: dst_path.to_string(),
            value_type,
        };

        match group {
            MappingGroup::Data => record.data.push(mapping),
            MappingGroup::Extra => record.extra.push(mapping),
        }
    }

    Ok(record)
}

/// Mapping table parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseMappingsError {
    #[error("mapping key '{key}' must encode '<dst>:<group>' or '<dst>:<value_type>:<group>'")]
    BadKey { key: String },

    #[error("mapping key '{key}' names unknown group '{group}'")]
    UnknownGroup { key: String, group: String },

    #[error("mapping key '{key}' names unknown value type '{value_type}'")]
    UnknownValueType { key: String, value_type: String },

    #[error("mapping key '{key}' has an empty destination or source path")]
    EmptyPath { key: String },
}
