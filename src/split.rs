//! Result splitting
//!
//! One network response covering many sub-queries is handed back item by item.
//! An item belongs to a sub-query when their token sets share at least one
//! token. The match is loose on purpose: services echo identifiers with or
//! without database prefixes and in varying case. Two identifiers sharing a
//! short token can both claim the same item.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::decompose::SubQuery;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '-' | '/' | '|')
}

fn push_tokens(text: &str, tokens: &mut BTreeSet<String>) {
    tokens.extend(
        text.split(is_separator)
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase),
    );
}

fn collect_tokens(value: &Value, tokens: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => push_tokens(s, tokens),
        Value::Number(n) => push_tokens(&n.to_string(), tokens),
        Value::Array(items) => items.iter().for_each(|item| collect_tokens(item, tokens)),
        Value::Object(map) => map.values().for_each(|item| collect_tokens(item, tokens)),
        Value::Null | Value::Bool(_) => {}
    }
}

/// Lower-cased tokens of every string and number leaf in `value`
pub fn tokenize(value: &Value) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    collect_tokens(value, &mut tokens);
    tokens
}

/// Which sub-query parameters count when matching items
#[derive(Debug, Clone, Default)]
pub struct MatchRule {
    /// Only these parameters, when set
    only: Option<BTreeSet<String>>,
    /// Never these parameters
    ignored: BTreeSet<String>,
}

impl MatchRule {
    /// Match on every parameter except `ignored`
    pub fn all_except<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: None,
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    /// Restricts matching to the given parameters
    pub fn only<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    fn applies_to(&self, name: &str) -> bool {
        if self.ignored.contains(name) {
            return false;
        }
        self.only.as_ref().map_or(true, |only| only.contains(name))
    }

    /// Tokens a sub-query expects to find in its items
    pub fn tokens_for(&self, sub: &SubQuery) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        for (name, value) in &sub.params {
            if self.applies_to(name) {
                collect_tokens(value, &mut tokens);
            }
        }
        tokens
    }
}

/// Assigns each item of `response` to the sub-queries it matches
///
/// Arrays are split item by item; any other non-null value counts as a single
/// item. Every sub-query id is present in the result, possibly with no items.
pub fn split(response: &Value, subqueries: &[SubQuery], rule: &MatchRule) -> BTreeMap<String, Vec<Value>> {
    let items: Vec<&Value> = match response {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let expected: Vec<(&str, BTreeSet<String>)> = subqueries
        .iter()
        .map(|sub| (sub.id.as_str(), rule.tokens_for(sub)))
        .collect();

    let mut buckets: BTreeMap<String, Vec<Value>> = subqueries
        .iter()
        .map(|sub| (sub.id.clone(), Vec::new()))
        .collect();

    for item in items {
        let item_tokens = tokenize(item);
        for (id, tokens) in &expected {
            if !tokens.is_disjoint(&item_tokens) {
                if let Some(bucket) = buckets.get_mut(*id) {
                    bucket.push(item.clone());
                }
            }
        }
    }
    buckets
}
