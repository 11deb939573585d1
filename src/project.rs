//! Field projection over nested responses
//!
//! Paths are dotted (`citation.title`). A segment that lands on a list is
//! applied to every element; a one-element result is unwrapped to the element
//! itself.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::method::value_type_name;

/// Which fields to keep, and under which names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Projection {
    /// Keep these paths, named by the path itself
    Keep(Vec<String>),
    /// Output name to source path, in output order
    Rename(IndexMap<String, String>),
}

impl Projection {
    /// Parses a comma-separated field list; `name=path` entries rename
    pub fn parse_list(text: &str) -> Self {
        let entries: Vec<&str> = text
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();

        if entries.iter().any(|entry| entry.contains('=')) {
            Projection::Rename(
                entries
                    .iter()
                    .map(|entry| match entry.split_once('=') {
                        Some((name, path)) => (name.trim().to_string(), path.trim().to_string()),
                        None => (entry.to_string(), entry.to_string()),
                    })
                    .collect(),
            )
        } else {
            Projection::Keep(entries.into_iter().map(String::from).collect())
        }
    }

    /// `(output name, source path)` pairs
    pub fn fields(&self) -> Vec<(&str, &str)> {
        match self {
            Projection::Keep(paths) => paths.iter().map(|p| (p.as_str(), p.as_str())).collect(),
            Projection::Rename(map) => map.iter().map(|(n, p)| (n.as_str(), p.as_str())).collect(),
        }
    }
}

/// Resolves a dotted path inside `data`
pub fn get_nested(data: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(data.clone());
    }

    match data {
        Value::Object(map) => {
            let (head, rest) = path.split_once('.').unwrap_or((path, ""));
            match map.get(head)? {
                value @ (Value::Object(_) | Value::Array(_)) => get_nested(value, rest),
                scalar if rest.is_empty() => Some(scalar.clone()),
                _ => None,
            }
        }
        Value::Array(items) => {
            let mut values: Vec<Value> = items
                .iter()
                .map(|item| get_nested(item, path).unwrap_or(Value::Null))
                .collect();
            if values.len() == 1 {
                values.pop()
            } else {
                Some(Value::Array(values))
            }
        }
        _ => None,
    }
}

/// Projects one record; `None` returns it unchanged
pub fn project_one(item: &Value, projection: Option<&Projection>) -> Value {
    let Some(projection) = projection else {
        return item.clone();
    };

    let mut out = Map::new();
    for (name, path) in projection.fields() {
        out.insert(name.to_string(), get_nested(item, path).unwrap_or(Value::Null));
    }
    Value::Object(out)
}

/// Projects a record, or every record of a sequence
pub fn project(data: &Value, projection: Option<&Projection>) -> Value {
    match data {
        Value::Array(items) => Value::Array(items.iter().map(|item| project_one(item, projection)).collect()),
        other => project_one(other, projection),
    }
}

/// Lists every dotted path in `data` with a type label
///
/// Sequences are described by their first element; `list(str)` and the like
/// mark sequences of scalars.
pub fn field_paths(data: &Value) -> BTreeMap<String, String> {
    let mut paths = BTreeMap::new();
    let data = match data {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return paths,
        },
        other => other,
    };

    match data {
        Value::Object(_) => collect_paths(data, "", &mut paths),
        other => {
            paths.insert("value".to_string(), value_type_name(other).to_string());
        }
    }
    paths
}

fn collect_paths(value: &Value, prefix: &str, paths: &mut BTreeMap<String, String>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, child) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match child {
            Value::Object(_) => collect_paths(child, &path, paths),
            Value::Array(items) => match items.first() {
                Some(first @ Value::Object(_)) => collect_paths(first, &path, paths),
                Some(first) => {
                    paths.insert(path, format!("list({})", value_type_name(first)));
                }
                None => {
                    paths.insert(path, "list".to_string());
                }
            },
            scalar => {
                paths.insert(path, value_type_name(scalar).to_string());
            }
        }
    }
}
