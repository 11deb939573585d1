//! Query decomposition
//!
//! A request that lists several identifiers in a groupable identity parameter is
//! split into one `SubQuery` per identifier combination. Each sub-query is
//! cached on its own; the ones still missing are merged back into a single wire
//! request.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::method::MethodSpec;
use crate::query::Params;
use crate::table::cell_text;

/// One independently cacheable unit of a larger request
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    /// Identifier built from the combination values and scalar identity values
    pub id: String,
    /// The original parameters with each grouped list replaced by one value
    pub params: Params,
}

/// Splits `params` into sub-queries
///
/// Returns an empty vector when no groupable identity parameter holds a list,
/// meaning the request is handled whole. Combinations follow the declaration
/// order of the groupable parameters, so identifiers are stable across runs.
pub fn decompose(params: &Params, spec: &MethodSpec) -> Vec<SubQuery> {
    let mut grouped: Vec<(&str, Vec<&Value>)> = Vec::new();
    for name in &spec.groupable {
        if !spec.param_spec(name).is_some_and(|p| p.identity) {
            continue;
        }
        if let Some(Value::Array(items)) = params.get(name) {
            let mut values: Vec<&Value> = Vec::with_capacity(items.len());
            for item in items {
                if !values.contains(&item) {
                    values.push(item);
                }
            }
            grouped.push((name.as_str(), values));
        }
    }

    if grouped.is_empty() || grouped.iter().any(|(_, values)| values.is_empty()) {
        return Vec::new();
    }

    // scalar identity values disambiguate sub-queries across non-grouped fields
    let scalar_ids: Vec<String> = spec
        .identity_names()
        .filter(|name| !grouped.iter().any(|(g, _)| g == name))
        .filter_map(|name| params.get(name))
        .filter(|value| !value.is_array() && !value.is_object())
        .map(cell_text)
        .collect();

    let mut combinations: Vec<Vec<&Value>> = vec![Vec::new()];
    for (_, values) in &grouped {
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for combination in &combinations {
            for value in values {
                let mut extended = combination.clone();
                extended.push(*value);
                next.push(extended);
            }
        }
        combinations = next;
    }

    let mut seen = BTreeSet::new();
    let mut subqueries = Vec::with_capacity(combinations.len());
    for combination in combinations {
        let mut sub_params = params.clone();
        for ((name, _), value) in grouped.iter().zip(combination.iter()) {
            sub_params.insert(name.to_string(), (*value).clone());
        }

        let id = combination
            .iter()
            .map(|value| cell_text(value))
            .chain(scalar_ids.iter().cloned())
            .collect::<Vec<_>>()
            .join("_");

        if seen.insert(id.clone()) {
            subqueries.push(SubQuery {
                id,
                params: sub_params,
            });
        }
    }
    subqueries
}

/// Merges sub-queries back into one request
///
/// Every groupable identity parameter present becomes the list of its distinct
/// values in sub-query order; everything else is taken from the first
/// sub-query.
pub fn merge(subqueries: &[SubQuery], spec: &MethodSpec) -> Params {
    let Some(first) = subqueries.first() else {
        return Params::new();
    };

    let mut merged = first.params.clone();
    for name in &spec.groupable {
        if !first.params.contains_key(name) {
            continue;
        }
        let mut values: Vec<Value> = Vec::new();
        for sub in subqueries {
            if let Some(value) = sub.params.get(name) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        merged.insert(name.clone(), Value::Array(values));
    }
    merged
}
