//! Filter registry and message routing.
//!
//! The handler keeps every index behind one mutex: mapping records and
//! identifier records deduplicated by content hash with their owning
//! filter ids, routing tables from identity to mapping hash to filter
//! ids, per-source ownership, and per-filter metadata for teardown.
//! Lookups snapshot what they need under the lock and extract after
//! releasing it, so a slow consumer never blocks registration.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::filter::{FilterDefinition, ValidationError};
use crate::hash;
use crate::identity::{self, IdentifierRecord};
use crate::mapping::{parse_mappings, MappingRecord, ParseMappingsError};
use crate::result::{FilterResults, ResultOptions};

/// A mapping record shared by every filter whose table hashes alike.
struct MappingEntry {
    record: Arc<MappingRecord>,
    owners: HashSet<String>,
}

/// An identifier record shared the same way.
struct IdentifierEntry {
    record: IdentifierRecord,
    owners: HashSet<String>,
}

/// Everything a registered filter pins, for exact reversal on removal.
struct FilterMetadata {
    source: String,
    mapping_hash: String,
    identifier_hash: Option<String>,
    identity: String,
    args: Option<Map<String, Value>>,
}

/// All registry state, guarded as one unit.
#[derive(Default)]
struct Indices {
    mappings: HashMap<String, MappingEntry>,
    /// Ordered so classification scans records deterministically.
    identifiers: BTreeMap<String, IdentifierEntry>,
    sources: HashMap<String, HashSet<String>>,
    /// identity -> mapping hash -> owning filter ids.
    routes: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
    metadata: HashMap<String, FilterMetadata>,
    sources_changed_at: Option<DateTime<Utc>>,
}

impl Indices {
    /// Reverse every index entry a filter owns, pruning entries whose
    /// last owner leaves. Unknown ids are a no-op.
    fn remove_filter(&mut self, id: &str) {
        let Some(meta) = self.metadata.remove(id) else {
            return;
        };

        if let Some(identifier_hash) = &meta.identifier_hash {
            if let Some(entry) = self.identifiers.get_mut(identifier_hash) {
                entry.owners.remove(id);
                if entry.owners.is_empty() {
                    self.identifiers.remove(identifier_hash);
                }
            }
        }

        if let Some(entry) = self.mappings.get_mut(&meta.mapping_hash) {
            entry.owners.remove(id);
            if entry.owners.is_empty() {
                self.mappings.remove(&meta.mapping_hash);
            }
        }

        if let Some(owners) = self.sources.get_mut(&meta.source) {
            owners.remove(id);
            if owners.is_empty() {
                self.sources.remove(&meta.source);
                self.sources_changed_at = Some(Utc::now());
            }
        }

        if let Some(by_hash) = self.routes.get_mut(&meta.identity) {
            if let Some(ids) = by_hash.get_mut(&meta.mapping_hash) {
                ids.remove(id);
                if ids.is_empty() {
                    by_hash.remove(&meta.mapping_hash);
                }
            }
            if by_hash.is_empty() {
                self.routes.remove(&meta.identity);
            }
        }
    }
}

// ===========================================================================
// Handler
// ===========================================================================

/// Thread-safe filter registry with routing and extraction.
///
/// Filters register under a caller-chosen id and are routed either by the
/// identity their identifier list claims or, without identifiers, by their
/// source. Filters sharing a mapping table share one parsed record and one
/// result item per message.
#[derive(Default)]
pub struct FilterHandler {
    indices: Mutex<Indices>,
}

impl FilterHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter, replacing any earlier registration of the same id.
    ///
    /// Replacement is atomic with respect to other calls: the old filter is
    /// torn down and the new one inserted under one lock acquisition, and a
    /// rejected definition leaves the registry untouched.
    pub fn add_filter(&self, definition: FilterDefinition) -> Result<(), AddFilterError> {
        definition.validate()?;

        let FilterDefinition {
            id,
            source,
            mappings,
            identifiers,
            args,
        } = definition;

        let mapping_hash = hash::hash_mappings(
            mappings.iter().map(|(key, value)| (key.as_str(), value.as_str())),
        );
        let parsed = identifiers.as_deref().map(identity::parse_identifiers);
        let identifier_hash = parsed.as_ref().map(|parsed| parsed.hash.clone());

        let mut indices = self.indices.lock().unwrap();

        // Parsing the mapping table is the only fallible step under the
        // lock; nothing is committed until it has a record.
        let record = match indices.mappings.get(&mapping_hash) {
            Some(entry) => Arc::clone(&entry.record),
            None => Arc::new(parse_mappings(&mappings)?),
        };

        let identity = match &parsed {
            Some(parsed) => parsed.identity.clone(),
            None => source.clone(),
        };

        if indices.metadata.contains_key(&id) {
            debug!(filter_id = %id, "filter id already registered, replacing");
            indices.remove_filter(&id);
        }

        if let Some(parsed) = parsed {
            indices
                .identifiers
                .entry(parsed.hash)
                .or_insert_with(|| IdentifierEntry {
                    record: parsed.record,
                    owners: HashSet::new(),
                })
                .owners
                .insert(id.clone());
        }

        indices
            .mappings
            .entry(mapping_hash.clone())
            .or_insert_with(|| MappingEntry {
                record,
                owners: HashSet::new(),
            })
            .owners
            .insert(id.clone());

        if !indices.sources.contains_key(&source) {
            indices.sources_changed_at = Some(Utc::now());
        }
        indices
            .sources
            .entry(source.clone())
            .or_default()
            .insert(id.clone());

        indices
            .routes
            .entry(identity.clone())
            .or_default()
            .entry(mapping_hash.clone())
            .or_default()
            .insert(id.clone());

        debug!(
            filter_id = %id,
            identity = %identity,
            mapping_hash = %mapping_hash,
            "filter registered"
        );

        indices.metadata.insert(
            id,
            FilterMetadata {
                source,
                mapping_hash,
                identifier_hash,
                identity,
                args,
            },
        );

        Ok(())
    }

    /// Remove a filter and every index entry it was the last owner of.
    pub fn delete_filter(&self, id: &str) -> Result<(), UnknownFilterIdError> {
        let mut indices = self.indices.lock().unwrap();
        if !indices.metadata.contains_key(id) {
            return Err(UnknownFilterIdError { id: id.to_string() });
        }
        indices.remove_filter(id);
        debug!(filter_id = %id, "filter deleted");
        Ok(())
    }

    /// Route a message and return one result item per distinct mapping
    /// configuration registered for it.
    ///
    /// The message is classified by the most specific identifier record
    /// whose keys it carries; without a match the `options` source, if
    /// any, is used as the routing key instead. A resolved identity with
    /// no registered route is an error and does not retry the source.
    pub fn get_results<'m, D, E>(
        &self,
        message: &'m Value,
        options: ResultOptions<'_, D, E>,
    ) -> Result<FilterResults<'m, D, E>, GetResultsError> {
        let fields = message
            .as_object()
            .ok_or(GetResultsError::MessageIdentification)?;

        let indices = self.indices.lock().unwrap();

        let identity = identity::identify(
            indices
                .identifiers
                .iter()
                .map(|(hash, entry)| (hash, &entry.record)),
            fields,
        )
        .or_else(|| options.source.map(str::to_string));

        let Some(identity) = identity else {
            return Err(GetResultsError::NoFilter { identity: None });
        };

        let Some(by_hash) = indices.routes.get(&identity) else {
            debug!(identity = %identity, "no filter registered for identity");
            return Err(GetResultsError::NoFilter {
                identity: Some(identity),
            });
        };

        let items: Vec<_> = by_hash
            .iter()
            .filter_map(|(mapping_hash, filter_ids)| {
                let entry = indices.mappings.get(mapping_hash)?;
                Some((Arc::clone(&entry.record), filter_ids.clone()))
            })
            .collect();

        Ok(FilterResults::new(message, items, options))
    }

    /// Opaque argument payload a filter registered with, empty if none.
    pub fn get_filter_args(
        &self,
        id: &str,
    ) -> Result<Map<String, Value>, UnknownFilterIdError> {
        let indices = self.indices.lock().unwrap();
        let meta = indices
            .metadata
            .get(id)
            .ok_or_else(|| UnknownFilterIdError { id: id.to_string() })?;
        Ok(meta.args.clone().unwrap_or_default())
    }

    /// Sources with at least one registered filter, sorted.
    pub fn get_sources(&self) -> BTreeSet<String> {
        let indices = self.indices.lock().unwrap();
        indices.sources.keys().cloned().collect()
    }

    /// When the source set last changed, `None` before the first change.
    pub fn get_sources_timestamp(&self) -> Option<DateTime<Utc>> {
        self.indices.lock().unwrap().sources_changed_at
    }
}

// ===========================================================================
// Errors
// ===========================================================================

/// Registration rejections. The registry is unchanged when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddFilterError {
    #[error("invalid filter definition: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid mapping table: {0}")]
    ParseMappings(#[from] ParseMappingsError),
}

/// Why a message produced no results at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GetResultsError {
    #[error("cannot identify message: not a structured record")]
    MessageIdentification,
    #[error(
        "no filter registered for message identity '{}'",
        .identity.as_deref().unwrap_or("<unresolved>")
    )]
    NoFilter { identity: Option<String> },
}

/// The id names no registered filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter id '{id}'")]
pub struct UnknownFilterIdError {
    pub id: String,
}
