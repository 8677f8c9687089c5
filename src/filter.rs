//! Filter definitions as submitted for registration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::Identifier;

/// A filter definition: where messages come from, which fields to pull
/// out of them, and optionally how to recognize them without a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Registering client's unique handle for this filter.
    pub id: String,
    /// Routing key used when the message carries no recognizable identity.
    pub source: String,
    /// Mapping table: `"dst_path:group"` or `"dst_path:value_type:group"`
    /// keys mapped to dotted source paths, in declaration order.
    pub mappings: IndexMap<String, String>,
    /// Identifier list for content-based classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<Identifier>>,
    /// Opaque client payload returned verbatim by argument lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
}

impl FilterDefinition {
    /// Definition with the mandatory fields set.
    pub fn new<K, V>(
        id: impl Into<String>,
        source: impl Into<String>,
        mappings: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            source: source.into(),
            mappings: mappings
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            identifiers: None,
            args: None,
        }
    }

    /// Attach an identifier list.
    pub fn with_identifiers(mut self, identifiers: impl IntoIterator<Item = Identifier>) -> Self {
        self.identifiers = Some(identifiers.into_iter().collect());
        self
    }

    /// Attach an opaque argument payload.
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = Some(args);
        self
    }

    /// Check the structural rules every definition must satisfy.
    ///
    /// Mapping keys and paths are validated separately when the table is
    /// parsed; this covers everything visible without parsing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if self.mappings.is_empty() {
            return Err(ValidationError::EmptyMappings);
        }
        if let Some(identifiers) = &self.identifiers {
            if identifiers.is_empty() {
                return Err(ValidationError::EmptyIdentifiers);
            }
            let mut seen = std::collections::BTreeSet::new();
            for identifier in identifiers {
                if identifier.key.is_empty() {
                    return Err(ValidationError::EmptyIdentifierKey);
                }
                if !seen.insert(identifier.key.as_str()) {
                    return Err(ValidationError::DuplicateIdentifierKey {
                        key: identifier.key.clone(),
                    });
                }
                match &identifier.value {
                    None => {}
                    Some(Value::String(text)) if !text.is_empty() => {}
                    Some(Value::Number(_)) => {}
                    Some(_) => {
                        return Err(ValidationError::InvalidIdentifierValue {
                            key: identifier.key.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

// ===========================================================================
// Errors
// ===========================================================================

/// Structural problems in a filter definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("filter id must not be empty")]
    EmptyId,
    #[error("filter source must not be empty")]
    EmptySource,
    #[error("filter must declare at least one mapping")]
    EmptyMappings,
    #[error("identifier list must not be empty when present")]
    EmptyIdentifiers,
    #[error("identifier key must not be empty")]
    EmptyIdentifierKey,
    #[error("duplicate identifier key '{key}'")]
    DuplicateIdentifierKey { key: String },
    #[error("identifier '{key}' value must be a non-empty string or a number")]
    InvalidIdentifierValue { key: String },
}
