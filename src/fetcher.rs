//! Fetch orchestration
//!
//! `Fetcher` ties one service adapter to its cache. A call resolves the method
//! spec, validates the query, decomposes grouped identifiers, serves what it can
//! from the cache and issues at most one network call for the rest. Batches
//! pre-scan the cache and send the misses through a bounded worker pool.

use futures::stream::{self, StreamExt};
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, Payload};
use crate::config::{EngineConfig, ProjectionTable};
use crate::decompose::{decompose, merge, SubQuery};
use crate::error::{Error, Result};
use crate::key::{CacheKey, KeyCanonicalizer};
use crate::method::{prepare, MethodSpec, ValidationError};
use crate::project::Projection;
use crate::query::{Params, Query};
use crate::service::{PreparedRequest, Service};
use crate::split::{split, MatchRule};
use crate::table::{cell_text, Table};

/// Per-call options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    /// Operation name
    pub method: String,
    /// Sub-operation or variant
    pub option: Option<String>,
    /// Reshape the raw response through the projector
    pub parse: bool,
    /// Also produce a table
    pub to_table: bool,
    /// Explicit projection; takes precedence over configured ones
    pub fields: Option<Projection>,
    /// Named projection in the configuration table
    pub config_key: Option<String>,
    /// Additional wire parameters applied to every query of the call
    pub extra: Params,
}

impl CallOptions {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    pub fn with_parse(mut self, parse: bool) -> Self {
        self.parse = parse;
        self
    }

    pub fn with_table(mut self, to_table: bool) -> Self {
        self.to_table = to_table;
        self
    }

    pub fn with_fields(mut self, fields: Projection) -> Self {
        self.fields = Some(fields);
        self.parse = true;
        self
    }

    pub fn with_config_key(mut self, key: impl Into<String>) -> Self {
        self.config_key = Some(key.into());
        self.parse = true;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Options that take part in cache keys
    ///
    /// Extra parameters reach the key through the query parameters they are
    /// merged into.
    pub fn key_options(&self) -> Params {
        let mut options = Params::from([("method".to_string(), Value::String(self.method.clone()))]);
        if let Some(option) = &self.option {
            options.insert("option".to_string(), Value::String(option.clone()));
        }
        options
    }
}

/// Outcome of one query
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Normalized response; `{id: [items]}` for decomposed queries
    pub raw: Value,
    /// Projected form, when parsing was requested
    pub parsed: Option<Value>,
    /// Tabular form, when requested
    pub table: Option<Table>,
    /// Whether nothing went over the network
    pub from_cache: bool,
}

impl FetchResult {
    /// The parsed form if present, else the raw response
    pub fn output(&self) -> &Value {
        self.parsed.as_ref().unwrap_or(&self.raw)
    }
}

/// Outcome of a batch
#[derive(Debug)]
pub enum BatchOutput {
    /// Every query produced a table; rows concatenated in input order
    Table(Table),
    /// One slot per input query, in input order
    Items(Vec<Result<FetchResult>>),
}

/// How one query will be served
enum Plan<'a> {
    /// A single cache entry and, on a miss, a single call
    Whole { key: CacheKey, wire: Params },
    /// One cache entry per sub-query; misses merged into one call
    Split {
        spec: &'a MethodSpec,
        parts: Vec<(SubQuery, CacheKey)>,
    },
}

/// Cache-aware fetch engine for one service
pub struct Fetcher {
    service: Arc<dyn Service>,
    cache: CacheStore,
    keys: KeyCanonicalizer,
    match_rule: MatchRule,
    projections: ProjectionTable,
    max_workers: usize,
    min_wait: Duration,
    max_wait: Duration,
}

impl Fetcher {
    /// Creates a fetcher over an explicit cache store
    pub fn new(service: Arc<dyn Service>, cache: CacheStore, config: &EngineConfig) -> Self {
        let keys = KeyCanonicalizer::new().with_ignored(service.cache_ignore_keys());
        let mut match_rule = MatchRule::all_except(keys.ignored().iter().cloned());
        if let Some(match_keys) = service.match_keys() {
            match_rule = match_rule.only(match_keys);
        }
        let projections = config.projections_for(service.name());

        Self {
            service,
            cache,
            keys,
            match_rule,
            projections,
            max_workers: config.max_workers.max(1),
            min_wait: Duration::from_millis(config.min_wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms.max(config.min_wait_ms)),
        }
    }

    /// Creates a fetcher caching under the configured or XDG cache directory
    pub fn for_service(service: Arc<dyn Service>, config: &EngineConfig) -> Result<Self> {
        let cache = match config.service_cache_dir(service.name()) {
            Some(dir) => CacheStore::with_dir(dir),
            None => CacheStore::new(service.name())
                .ok_or_else(|| Error::NoCacheDir(service.name().to_string()))?,
        };
        Ok(Self::new(service, cache, config))
    }

    pub fn service(&self) -> &dyn Service {
        self.service.as_ref()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Cache keys a query maps to: one per sub-query, or a single key
    pub fn cache_keys(&self, query: &Query, opts: &CallOptions) -> Result<Vec<CacheKey>> {
        let spec = self.resolve(opts)?;
        Ok(match self.plan(query, spec, opts)? {
            Plan::Whole { key, .. } => vec![key],
            Plan::Split { parts, .. } => parts.into_iter().map(|(_, key)| key).collect(),
        })
    }

    /// Fetches one query, from the cache when possible
    ///
    /// # Arguments
    /// * `query` - Identifier, identifier group or parameter map
    /// * `opts` - Method, variant and output options
    ///
    /// # Returns
    /// The result, or the first validation or fetch error
    pub async fn fetch_single(&self, query: &Query, opts: &CallOptions) -> Result<FetchResult> {
        let spec = self.resolve(opts)?;
        let plan = self.plan(query, spec, opts)?;
        self.run(plan, spec, opts).await
    }

    /// Fetches many queries, isolating per-query failures
    ///
    /// Every query is validated before any work starts. Cached queries are
    /// answered directly; the rest run on at most `max_workers` concurrent
    /// calls. Output order always matches input order.
    ///
    /// # Arguments
    /// * `queries` - The queries, each handled like `fetch_single`
    /// * `opts` - Options shared by every query
    ///
    /// # Returns
    /// One concatenated table when tables were requested and every query
    /// succeeded, otherwise one slot per query
    pub async fn fetch_batch(&self, queries: &[Query], opts: &CallOptions) -> Result<BatchOutput> {
        let spec = self.resolve(opts)?;

        let mut slots: Vec<Option<Result<FetchResult>>> = queries.iter().map(|_| None).collect();
        let mut pending = Vec::new();
        for (index, query) in queries.iter().enumerate() {
            let plan = self.plan(query, spec, opts)?;
            match self.cached(&plan, opts) {
                Some(hit) => slots[index] = Some(Ok(hit)),
                None => pending.push((index, plan)),
            }
        }

        info!(
            service = self.service.name(),
            total = queries.len(),
            cached = queries.len() - pending.len(),
            fetching = pending.len(),
            "batch pre-scan complete"
        );

        let finished: Vec<(usize, Result<FetchResult>)> = stream::iter(pending)
            .map(|(index, plan)| async move { (index, self.run(plan, spec, opts).await) })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        let mut failed = 0;
        for (index, result) in finished {
            if let Err(err) = &result {
                warn!(service = self.service.name(), index, error = %err, "batch item failed");
                failed += 1;
            }
            slots[index] = Some(result);
        }
        if failed > 0 {
            info!(service = self.service.name(), failed, "batch finished with failures");
        }

        let items: Vec<Result<FetchResult>> = slots.into_iter().flatten().collect();

        if opts.to_table && !items.is_empty() {
            let all_tables = items
                .iter()
                .all(|item| matches!(item, Ok(FetchResult { table: Some(_), .. })));
            if all_tables {
                let mut combined = Table::default();
                for item in &items {
                    if let Ok(FetchResult { table: Some(table), .. }) = item {
                        combined.concat(table);
                    }
                }
                return Ok(BatchOutput::Table(combined));
            }
        }

        Ok(BatchOutput::Items(items))
    }

    fn resolve(&self, opts: &CallOptions) -> Result<&MethodSpec> {
        Ok(self
            .service
            .specs()
            .resolve(&opts.method, opts.option.as_deref())?)
    }

    /// Validates a query and works out its cache keys
    fn plan<'a>(&self, query: &Query, spec: &'a MethodSpec, opts: &CallOptions) -> Result<Plan<'a>> {
        let mut params = query.to_params(spec)?;
        for (name, value) in &opts.extra {
            params.entry(name.clone()).or_insert_with(|| value.clone());
        }

        let empty_group = spec
            .identity_names()
            .any(|name| matches!(params.get(name), Some(Value::Array(items)) if items.is_empty()));
        if empty_group {
            return Err(ValidationError::EmptyQuery.into());
        }

        let wire = prepare(&params, spec)?;
        self.service.validate_query(&opts.method, &params)?;
        let subqueries = decompose(&params, spec);

        if subqueries.is_empty() {
            let key = self.entry_key(&params, spec, opts);
            debug!(key = %key, "planned single request");
            return Ok(Plan::Whole { key, wire });
        }

        let parts: Vec<(SubQuery, CacheKey)> = subqueries
            .into_iter()
            .map(|sub| {
                let key = self.entry_key(&sub.params, spec, opts);
                (sub, key)
            })
            .collect();
        debug!(subqueries = parts.len(), "planned decomposed request");
        Ok(Plan::Split { spec, parts })
    }

    /// Key for one cache entry
    ///
    /// Every declared parameter takes part with its default filled in, so
    /// leaving a defaulted value out and passing it explicitly share a key.
    /// Identity parameters form the base and keep their names, unless the
    /// method declares a single one; the rest goes into the options part.
    /// An identifier cached as part of a group is found again when asked for
    /// alone, since its sub-query carries the same parameters.
    fn entry_key(&self, params: &Params, spec: &MethodSpec, opts: &CallOptions) -> CacheKey {
        let mut options = opts.key_options();
        let mut identity = Params::new();
        for (name, param) in &spec.parameters {
            let Some(value) = params.get(name).or(param.default.as_ref()) else {
                continue;
            };
            if param.identity {
                identity.insert(name.clone(), value.clone());
            } else {
                options.insert(name.clone(), value.clone());
            }
        }

        let base = match sole_identity(&identity, spec) {
            Some(text) => Query::Scalar(text),
            None => Query::Params(identity),
        };
        self.keys.make_cache_key(&base, &options)
    }

    /// Serves a plan entirely from the cache, or not at all
    fn cached(&self, plan: &Plan<'_>, opts: &CallOptions) -> Option<FetchResult> {
        match plan {
            Plan::Whole { key, .. } => {
                let payload = self.load(key)?;
                Some(self.finish_whole(payload, true, opts))
            }
            Plan::Split { parts, .. } => {
                let mut entries = Vec::with_capacity(parts.len());
                for (sub, key) in parts {
                    let payload = self.load(key)?;
                    entries.push((sub.id.clone(), payload.into_records()));
                }
                Some(self.finish_split(entries, true, opts))
            }
        }
    }

    async fn run(&self, plan: Plan<'_>, spec: &MethodSpec, opts: &CallOptions) -> Result<FetchResult> {
        match plan {
            Plan::Whole { key, wire } => {
                if let Some(payload) = self.load(&key) {
                    return Ok(self.finish_whole(payload, true, opts));
                }
                let payload = self.call(spec, opts, wire).await?;
                if !payload.is_empty() {
                    self.store(&key, &payload);
                }
                Ok(self.finish_whole(payload, false, opts))
            }
            Plan::Split { spec, parts } => self.run_split(spec, parts, opts).await,
        }
    }

    async fn run_split(
        &self,
        spec: &MethodSpec,
        parts: Vec<(SubQuery, CacheKey)>,
        opts: &CallOptions,
    ) -> Result<FetchResult> {
        let mut entries: Vec<(String, Option<Vec<Value>>)> = Vec::with_capacity(parts.len());
        let mut missing: Vec<(SubQuery, CacheKey)> = Vec::new();
        for (sub, key) in parts {
            match self.load(&key) {
                Some(payload) => entries.push((sub.id, Some(payload.into_records()))),
                None => {
                    entries.push((sub.id.clone(), None));
                    missing.push((sub, key));
                }
            }
        }

        let from_cache = missing.is_empty();
        if !from_cache {
            debug!(
                hits = entries.len() - missing.len(),
                misses = missing.len(),
                "fetching missing sub-queries in one call"
            );
            let subqueries: Vec<SubQuery> = missing.iter().map(|(sub, _)| sub.clone()).collect();
            let wire = prepare(&merge(&subqueries, spec), spec)?;
            let response = match self.call(spec, opts, wire).await? {
                Payload::Json(value) => value,
                Payload::Table(table) => Value::Array(table.to_records()),
            };

            let mut buckets = split(&response, &subqueries, &self.match_rule);
            for (sub, key) in &missing {
                let items = buckets.remove(&sub.id).unwrap_or_default();
                if items.is_empty() {
                    debug!(id = %sub.id, "no items matched sub-query");
                } else {
                    self.store(key, &Payload::Json(Value::Array(items.clone())));
                }
                if let Some(slot) = entries.iter_mut().find(|(id, _)| id == &sub.id) {
                    slot.1 = Some(items);
                }
            }
        }

        let entries = entries
            .into_iter()
            .map(|(id, items)| (id, items.unwrap_or_default()))
            .collect();
        Ok(self.finish_split(entries, from_cache, opts))
    }

    /// Reads a cache entry; unreadable entries count as misses
    fn load(&self, key: &CacheKey) -> Option<Payload> {
        match self.cache.read(key) {
            Ok(Some(entry)) => {
                debug!(key = %key, "cache hit");
                Some(entry.payload)
            }
            Ok(None) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "unreadable cache entry, refetching");
                None
            }
        }
    }

    fn store(&self, key: &CacheKey, payload: &Payload) {
        if let Err(err) = self.cache.write(key, payload) {
            warn!(key = %key, error = %err, "failed to write cache entry");
        }
    }

    /// One collaborator round-trip followed by the rate-limit pause
    async fn call(&self, spec: &MethodSpec, opts: &CallOptions, params: Params) -> Result<Payload> {
        let request = PreparedRequest {
            method: opts.method.clone(),
            option: opts.option.clone(),
            verb: spec.verb,
            path_param: spec.path_param.clone(),
            params,
        };

        info!(service = self.service.name(), method = %opts.method, option = ?opts.option, "calling service");
        let result = self.service.fetch(&request).await;

        let pause = self.pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        Ok(result?)
    }

    fn pause(&self) -> Duration {
        jitter(self.min_wait, self.max_wait)
    }

    fn projection<'a>(&'a self, opts: &'a CallOptions) -> Option<&'a Projection> {
        opts.fields.as_ref().or_else(|| {
            self.projections
                .resolve(opts.config_key.as_deref(), &opts.method, opts.option.as_deref())
        })
    }

    fn parse_items(&self, items: &[Value], projection: Option<&Projection>) -> Vec<Value> {
        items
            .iter()
            .map(|item| self.service.parse_one(item, projection))
            .collect()
    }

    fn finish_whole(&self, payload: Payload, from_cache: bool, opts: &CallOptions) -> FetchResult {
        let (raw, source_table) = match payload {
            Payload::Json(value) => (value, None),
            Payload::Table(table) => (Value::Array(table.to_records()), Some(table)),
        };

        let parsed = opts.parse.then(|| match &raw {
            Value::Array(items) => Value::Array(self.parse_items(items, self.projection(opts))),
            other => self.service.parse_one(other, self.projection(opts)),
        });

        let table = opts.to_table.then(|| match (&parsed, source_table) {
            (None, Some(table)) => table,
            (Some(parsed), _) => Table::from_records(&records(parsed)),
            (None, None) => Table::from_records(&records(&raw)),
        });

        FetchResult {
            raw,
            parsed,
            table,
            from_cache,
        }
    }

    fn finish_split(&self, entries: Vec<(String, Vec<Value>)>, from_cache: bool, opts: &CallOptions) -> FetchResult {
        let projection = self.projection(opts);

        let mut raw = Map::new();
        let mut parsed = Map::new();
        let mut rows = Vec::with_capacity(entries.len());
        let mut ids = Vec::with_capacity(entries.len());
        for (id, items) in entries {
            let shown = if opts.parse {
                let items = self.parse_items(&items, projection);
                parsed.insert(id.clone(), Value::Array(items.clone()));
                items
            } else {
                items.clone()
            };
            if opts.to_table {
                let mut row = collapse(&shown);
                // the sub-query id owns the `id` column
                if let Value::Object(fields) = &mut row {
                    fields.remove("id");
                }
                rows.push(row);
                ids.push(id.clone());
            }
            raw.insert(id, Value::Array(items));
        }

        let table = opts.to_table.then(|| {
            let mut table = Table::from_records(&rows);
            table.insert_column(0, "id", ids);
            table
        });

        FetchResult {
            raw: Value::Object(raw),
            parsed: opts.parse.then_some(Value::Object(parsed)),
            table,
            from_cache,
        }
    }
}

/// Scalar value of the method's only identity parameter
fn sole_identity(identity: &Params, spec: &MethodSpec) -> Option<String> {
    let mut names = spec.identity_names();
    let (Some(name), None) = (names.next(), names.next()) else {
        return None;
    };
    match identity.get(name)? {
        Value::Array(_) | Value::Object(_) | Value::Null => None,
        value => Some(cell_text(value)),
    }
}

/// Uniform delay in `[min, max]`; `min` when the range is empty
fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let low = min.as_millis() as u64;
    let high = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

fn records(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Folds a bucket into one table row
///
/// A single record is used as-is; several records become one object whose
/// fields hold the list of values across records.
fn collapse(items: &[Value]) -> Value {
    match items {
        [] => Value::Object(Map::new()),
        [single] => single.clone(),
        many => {
            let mut row = Map::new();
            for item in many {
                let object = match item {
                    Value::Object(map) => map.clone(),
                    other => Map::from_iter([("value".to_string(), other.clone())]),
                };
                for (field, value) in object {
                    let entry = row.entry(field).or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(values) = entry {
                        values.push(value);
                    }
                }
            }
            Value::Object(row)
        }
    }
}
