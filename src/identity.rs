//! Identifier records and message classification.
//!
//! A filter may declare identifiers: keys a message must carry, each either
//! pinned to a literal value or left as a wildcard. Registration
//! canonicalizes the list into a shared, value-free record; at message time
//! the most specific matching record turns the message's own values into
//! the identity string used as the routing key.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::hash;

/// One identifier entry in a filter definition.
///
/// A `None` value declares a wildcard: the key must be present in a
/// message but its value does not participate in the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    /// Message key the identifier pins.
    pub key: String,
    /// Literal value, or `None` for a wildcard key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Identifier {
    /// Identifier that pins `key` to a literal value.
    pub fn with_value(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Wildcard identifier: `key` must exist, any value.
    pub fn wildcard(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// Canonical, value-free form of one identifier list.
///
/// Filters whose identifier lists agree on keys and on which of them carry
/// values share one record; the literal values themselves are not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRecord {
    all_keys: BTreeSet<String>,
    value_keys: Vec<String>,
    no_value_keys_joined: String,
    key_count: usize,
}

impl IdentifierRecord {
    /// Number of keys the record requires a message to carry.
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// True when every required key appears at the message's top level.
    fn matches(&self, message: &Map<String, Value>) -> bool {
        self.all_keys.iter().all(|key| message.contains_key(key))
    }

    /// Identity string for a message classified by this record.
    fn identity_for(&self, message: &Map<String, Value>) -> String {
        let mut identity = String::new();
        for key in &self.value_keys {
            if let Some(value) = message.get(key) {
                identity.push_str(&identity_fragment(value));
            }
        }
        identity.push_str(&self.no_value_keys_joined);
        identity
    }
}

/// One identifier list canonicalized at registration time.
pub(crate) struct ParsedIdentifiers {
    /// Dedup key: hash of the sorted value keys followed by the sorted
    /// wildcard keys, so the partition stays part of the key.
    pub(crate) hash: String,
    /// Shared record.
    pub(crate) record: IdentifierRecord,
    /// Identity string the registering filter claims, built from its own
    /// literal values.
    pub(crate) identity: String,
}

/// Canonicalize an identifier list.
///
/// Assumes the list passed definition validation: keys are unique and
/// non-empty, literal values are non-empty strings or numbers.
pub(crate) fn parse_identifiers(identifiers: &[Identifier]) -> ParsedIdentifiers {
    let mut valued: Vec<(&str, &Value)> = Vec::new();
    let mut wildcards: Vec<&str> = Vec::new();

    for identifier in identifiers {
        match &identifier.value {
            Some(value) => valued.push((identifier.key.as_str(), value)),
            None => wildcards.push(identifier.key.as_str()),
        }
    }

    valued.sort_by(|a, b| a.0.cmp(b.0));
    wildcards.sort_unstable();

    let hash = hash::hash_keys(valued.iter().map(|(key, _)| *key).chain(wildcards.iter().copied()));

    let mut identity: String = valued.iter().map(|(_, value)| identity_fragment(value)).collect();
    let no_value_keys_joined = wildcards.concat();
    identity.push_str(&no_value_keys_joined);

    let record = IdentifierRecord {
        all_keys: identifiers.iter().map(|i| i.key.clone()).collect(),
        value_keys: valued.iter().map(|(key, _)| (*key).to_string()).collect(),
        no_value_keys_joined,
        key_count: identifiers.len(),
    };

    ParsedIdentifiers {
        hash,
        record,
        identity,
    }
}

/// Classify a message against registered records.
///
/// Subset scan over all records; the most specific match (largest key
/// count) wins, and on ties the first record in scan order is kept.
pub(crate) fn identify<'a, I>(records: I, message: &Map<String, Value>) -> Option<String>
where
    I: IntoIterator<Item = (&'a String, &'a IdentifierRecord)>,
{
    let mut best: Option<(&String, &IdentifierRecord)> = None;

    for (hash, record) in records {
        if !record.matches(message) {
            continue;
        }
        match best {
            Some((_, current)) if current.key_count >= record.key_count => {}
            _ => best = Some((hash, record)),
        }
    }

    let (hash, record) = best?;
    let identity = record.identity_for(message);
    trace!(
        identifier_hash = %hash,
        key_count = record.key_count,
        identity = %identity,
        "message classified"
    );
    Some(identity)
}

/// Canonical text a value contributes to an identity string.
fn identity_fragment(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
