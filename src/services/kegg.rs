//! KEGG REST adapter
//!
//! Entries are requested through path segments
//! (`/get/hsa:10458+ece:Z5100/aaseq`) and come back as flat-file text, one
//! record per entry terminated by `///`, or FASTA for the sequence options.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cache::Payload;
use crate::method::{MethodSpec, ParamType, SpecError, SpecRegistry, ValidationError};
use crate::project::{project_one, Projection};
use crate::query::Params;
use crate::service::{PreparedRequest, Service};
use crate::table::cell_text;
use crate::transport::{FetchError, HttpTransport};

pub const KEGG_API_URL: &str = "https://rest.kegg.jp";

/// Databases accepted by the `db` parameter
pub const DATABASES: &[&str] = &[
    "pathway", "brite", "module", "genome", "compound", "glycan", "reaction", "enzyme", "network",
    "disease", "drug", "genes", "ligand", "kegg",
];

/// Variants accepted by `get`
pub const GET_OPTIONS: &[&str] = &["aaseq", "ntseq", "mol", "kcf", "image", "conf", "kml", "json"];

pub struct Kegg {
    transport: HttpTransport,
    base_url: String,
    specs: SpecRegistry,
}

impl Kegg {
    pub fn new(transport: HttpTransport) -> Result<Self, SpecError> {
        Self::with_base_url(transport, KEGG_API_URL)
    }

    pub fn with_base_url(transport: HttpTransport, base_url: impl Into<String>) -> Result<Self, SpecError> {
        let specs = SpecRegistry::new().with(
            "get",
            None,
            MethodSpec::get()
                .identity("entries", ParamType::Str, None)
                .param("db", ParamType::Str, None)
                .path_param("db")
                .group_by(&["entries"], "+")
                .options(GET_OPTIONS),
        )?;

        Ok(Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            specs,
        })
    }

    /// `<base>/<method>[/<db>]/<entries>[/<option>]`
    fn url_for(&self, request: &PreparedRequest) -> String {
        let mut segments = vec![self.base_url.clone(), request.method.clone()];
        segments.extend(request.path_value().filter(|db| !db.is_empty()));
        segments.extend(
            request
                .query_params()
                .get("entries")
                .map(cell_text)
                .filter(|entries| !entries.is_empty()),
        );
        segments.extend(request.option.clone().filter(|option| !option.is_empty()));
        segments.join("/")
    }
}

#[async_trait]
impl Service for Kegg {
    fn name(&self) -> &str {
        "kegg"
    }

    fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    fn validate_query(&self, _method: &str, params: &Params) -> Result<(), ValidationError> {
        match params.get("db").and_then(Value::as_str) {
            Some(db) if !DATABASES.contains(&db) => Err(ValidationError::UnsupportedValue {
                name: "database".to_string(),
                value: db.to_string(),
                expected: DATABASES.join(", "),
            }),
            _ => Ok(()),
        }
    }

    async fn fetch(&self, request: &PreparedRequest) -> Result<Payload, FetchError> {
        let url = self.url_for(request);
        let text = self.transport.get_text(&url, &[]).await?;
        let records = split_records(&text)
            .into_iter()
            .map(Value::String)
            .collect();
        Ok(Payload::Json(Value::Array(records)))
    }

    fn parse_one(&self, item: &Value, projection: Option<&Projection>) -> Value {
        let parsed = match item {
            Value::String(text) if text.starts_with('>') => parse_fasta(text),
            Value::String(text) => parse_flat_file(text),
            other => other.clone(),
        };
        project_one(&parsed, projection)
    }

    fn match_keys(&self) -> Option<Vec<String>> {
        Some(vec!["entries".to_string()])
    }
}

/// Splits a response body into one string per entry
pub fn split_records(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.contains("///") {
        return text
            .split("///")
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(String::from)
            .collect();
    }

    if text.starts_with('>') {
        let mut records: Vec<String> = Vec::new();
        for line in text.lines() {
            match records.last_mut() {
                Some(record) if !line.starts_with('>') => {
                    record.push('\n');
                    record.push_str(line);
                }
                _ => records.push(line.to_string()),
            }
        }
        return records;
    }

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect()
}

/// `KEY  value` at the start of a line: a word, then two or more spaces or a tab
fn split_key_line(line: &str) -> Option<(&str, &str)> {
    let key_end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    if key_end == 0 {
        return None;
    }
    let (key, rest) = line.split_at(key_end);
    let value = rest.trim_start_matches([' ', '\t']);
    let gap = &rest[..rest.len() - value.len()];
    let separated = gap.starts_with('\t') || gap.len() >= 2;
    if !separated || value.trim().is_empty() {
        return None;
    }
    Some((key, value.trim_end()))
}

/// Turns one flat-file record into a key/value map
///
/// Repeated keys collect into lists. Continuation lines are appended to the
/// current value, or pushed onto it when it is already a list. `AASEQ` and
/// `NTSEQ` are split into a length field and the bare sequence.
pub fn parse_flat_file(text: &str) -> Value {
    let mut entry = Map::new();
    let mut current: Option<String> = None;

    for line in text.trim().lines() {
        if let Some((key, value)) = split_key_line(line) {
            let value = Value::String(value.to_string());
            match entry.get_mut(key) {
                None => {
                    entry.insert(key.to_string(), value);
                }
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
            current = Some(key.to_string());
            continue;
        }

        let continuation = line.trim();
        let Some(key) = current.as_deref() else {
            continue;
        };
        match entry.get_mut(key) {
            Some(Value::Array(values)) => values.push(Value::String(continuation.to_string())),
            Some(Value::String(value)) => {
                value.push(' ');
                value.push_str(continuation);
            }
            _ => {}
        }
    }

    for (seq_key, len_key) in [("AASEQ", "AALEN"), ("NTSEQ", "NTLEN")] {
        let Some(Value::String(seq)) = entry.get(seq_key) else {
            continue;
        };
        let mut parts = seq.split(' ');
        let length = parts.next().unwrap_or_default().to_string();
        let sequence: String = parts.collect();
        entry.insert(len_key.to_string(), Value::String(length));
        entry.insert(seq_key.to_string(), Value::String(sequence));
    }

    Value::Object(entry)
}

/// FASTA record into `ENTRY`, `DEFINITION`, `SEQUENCE` and `LENGTH`
fn parse_fasta(text: &str) -> Value {
    let mut lines = text.trim().lines();
    let header = lines.next().unwrap_or_default().trim_start_matches('>');
    let (entry, definition) = header.split_once(char::is_whitespace).unwrap_or((header, ""));
    let sequence: String = lines.map(str::trim).collect();

    let mut record = Map::new();
    record.insert("ENTRY".to_string(), Value::String(entry.to_string()));
    record.insert("DEFINITION".to_string(), Value::String(definition.trim().to_string()));
    record.insert("LENGTH".to_string(), Value::String(sequence.len().to_string()));
    record.insert("SEQUENCE".to_string(), Value::String(sequence));
    Value::Object(record)
}
