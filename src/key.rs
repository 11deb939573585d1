//! Canonical cache keys
//!
//! A key is derived from the query plus the call options that change what the
//! service returns. Map keys are sorted, lists of scalars are sorted and
//! volatile options (pagination, output flags) are dropped, so two requests
//! that ask for the same thing always share a key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::query::{Params, Query};

/// Separates the query part of a key from its options part
pub const KEY_DELIMITER: &str = "|";

/// Options that never contribute to a key
pub const DEFAULT_IGNORED_KEYS: &[&str] = &[
    "parse",
    "to_table",
    "fields_to_extract",
    "config_key",
    "format",
    "output_format",
    "page",
    "offset",
    "cursor",
];

/// Canonical key text for one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns queries and options into `CacheKey`s
#[derive(Debug, Clone)]
pub struct KeyCanonicalizer {
    ignored: BTreeSet<String>,
}

impl Default for KeyCanonicalizer {
    fn default() -> Self {
        Self {
            ignored: DEFAULT_IGNORED_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl KeyCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds names to the ignored set
    pub fn with_ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.contains(name)
    }

    pub fn ignored(&self) -> &BTreeSet<String> {
        &self.ignored
    }

    /// Builds the key for `query` under `options`
    ///
    /// Scalars are used verbatim; groups and parameter maps are serialized
    /// canonically. When the query part is empty the options part alone is
    /// the key.
    pub fn make_cache_key(&self, query: &Query, options: &Params) -> CacheKey {
        let base = match query {
            Query::Scalar(id) => id.clone(),
            Query::Group(ids) if ids.is_empty() => String::new(),
            Query::Group(ids) => {
                let values = ids.iter().cloned().map(Value::String).collect();
                canonicalize(&Value::Array(values)).to_string()
            }
            Query::Params(params) => self.canonical_params(params),
        };
        let suffix = self.canonical_params(options);

        let text = match (base.is_empty(), suffix.is_empty()) {
            (true, _) => suffix,
            (false, true) => base,
            (false, false) => format!("{}{}{}", base, KEY_DELIMITER, suffix),
        };
        CacheKey(text)
    }

    /// Serializes a parameter map without ignored entries; empty when nothing remains
    fn canonical_params(&self, params: &Params) -> String {
        let kept: Map<String, Value> = params
            .iter()
            .filter(|(name, _)| !self.is_ignored(name))
            .map(|(name, value)| (name.clone(), canonicalize(value)))
            .collect();
        if kept.is_empty() {
            String::new()
        } else {
            Value::Object(kept).to_string()
        }
    }
}

/// Recursively sorts lists whose elements are all scalars
///
/// Lists holding maps or lists keep their order; sorting heterogeneous
/// structures would not be stable. Object keys are sorted.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonicalize).collect();
            if items.iter().all(|item| !item.is_array() && !item.is_object()) {
                items.sort_by_cached_key(|item| item.to_string());
            }
            Value::Array(items)
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .map(|(name, value)| (name, canonicalize(value)))
                .collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(name, value)| (name.clone(), value))
                    .collect(),
            )
        }
        other => other.clone(),
    }
}
