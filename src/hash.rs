//! Content hashing for deduplication keys.
//!
//! Mapping tables and identifier key sequences are deduplicated by the
//! digest of their canonical text. Hash collisions are treated as identity.

use sha2::{Digest, Sha256};

/// Hash a string into a lowercase hex digest.
pub fn hash_str(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a key sequence in its given order.
///
/// Callers are responsible for canonical ordering; identifier records hash
/// their sorted value keys followed by their sorted wildcard keys, so the
/// partition stays part of the dedup key.
pub fn hash_keys<I, S>(keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();
    for key in keys {
        joined.push_str(key.as_ref());
    }
    hash_str(&joined)
}

/// Hash an unordered key/value collection into a lowercase hex digest.
///
/// Each key is concatenated with its value; the concatenations are sorted
/// and joined before digesting, so insertion order never changes the key.
pub fn hash_mappings<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut parts: Vec<String> = entries
        .into_iter()
        .map(|(key, value)| format!("{}{}", key, value))
        .collect();
    parts.sort_unstable();
    hash_str(&parts.concat())
}
