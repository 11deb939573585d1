//! Integration tests for the fetch engine
//!
//! A counting in-process service stands in for the network so cache hits,
//! decomposition and batch behavior can be observed call by call.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use bioquery::config::{EngineConfig, ProjectionTable};
use bioquery::fetcher::{BatchOutput, CallOptions, Fetcher};
use bioquery::method::{MethodSpec, ParamType, SpecRegistry, ValidationError};
use bioquery::project::Projection;
use bioquery::query::{Params, Query};
use bioquery::service::{PreparedRequest, Service};
use bioquery::services::{BioDbNet, Kegg};
use bioquery::table::Table;
use bioquery::transport::{FetchError, HttpTransport};
use bioquery::{CacheStore, Error, Payload};

/// Answers `lookup` with one record per comma-separated id and `table` with
/// a two-column table. Ids ending in a higher digit answer sooner. The id
/// `forbidden` fails service-specific validation.
struct MockService {
    specs: SpecRegistry,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<Params>>,
    fail_id: Option<String>,
}

impl MockService {
    fn new() -> Self {
        let specs = SpecRegistry::new()
            .with(
                "lookup",
                None,
                MethodSpec::get()
                    .identity("id", ParamType::Str, None)
                    .param("format", ParamType::Str, Some(json!("json")))
                    .group_by(&["id"], ",")
                    .options(&["brief"]),
            )
            .unwrap()
            .with("table", None, MethodSpec::get().identity("id", ParamType::Str, None))
            .unwrap();

        Self {
            specs,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail_id: None,
        }
    }

    fn failing_on(id: &str) -> Self {
        Self {
            fail_id: Some(id.to_string()),
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> Params {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    fn requested_ids(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|params| params["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn answer(&self, request: &PreparedRequest) -> Result<Payload, FetchError> {
        let ids: Vec<String> = request.params["id"]
            .as_str()
            .unwrap_or_default()
            .split(',')
            .map(String::from)
            .collect();

        if let Some(fail) = &self.fail_id {
            if ids.contains(fail) {
                return Err(FetchError::Status {
                    url: format!("mock://{}", request.method),
                    status: 500,
                });
            }
        }

        // later ids finish first so completion order differs from input order
        let digit = ids[0].chars().last().and_then(|c| c.to_digit(10)).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(u64::from(10 - digit.min(9)) * 5)).await;

        let found: Vec<&String> = ids.iter().filter(|id| !id.starts_with("missing")).collect();
        if request.method == "table" {
            let mut table = Table::new(vec!["id".into(), "name".into()]);
            for id in found {
                table.push_row(vec![id.clone(), format!("name-{}", id)]);
            }
            return Ok(Payload::Table(table));
        }
        Ok(Payload::Json(Value::Array(found.into_iter().map(|id| record(id)).collect())))
    }
}

fn record(id: &str) -> Value {
    let score = id.chars().last().and_then(|c| c.to_digit(10)).unwrap_or(0);
    json!({"id": id, "name": format!("name-{}", id), "nested": {"score": score}})
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &str {
        "mock"
    }

    fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    fn validate_query(&self, _method: &str, params: &Params) -> Result<(), ValidationError> {
        match params.get("id") {
            Some(id) if id == "forbidden" => Err(ValidationError::UnsupportedValue {
                name: "id".into(),
                value: "forbidden".into(),
                expected: "anything else".into(),
            }),
            _ => Ok(()),
        }
    }

    async fn fetch(&self, request: &PreparedRequest) -> Result<Payload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.params.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.answer(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn quiet_config() -> EngineConfig {
    EngineConfig {
        min_wait_ms: 0,
        max_wait_ms: 0,
        max_workers: 3,
        ..EngineConfig::default()
    }
}

fn setup(service: MockService, config: &EngineConfig) -> (Arc<MockService>, Fetcher, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mock = Arc::new(service);
    let fetcher = Fetcher::new(mock.clone(), CacheStore::with_dir(temp_dir.path()), config);
    (mock, fetcher, temp_dir)
}

fn lookup() -> CallOptions {
    CallOptions::new("lookup")
}

#[tokio::test]
async fn test_second_fetch_is_served_from_cache() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let query = Query::from("P1");

    let first = fetcher.fetch_single(&query, &lookup()).await.unwrap();
    let second = fetcher.fetch_single(&query, &lookup()).await.unwrap();

    assert_eq!(mock.calls(), 1);
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.raw, second.raw);
}

#[tokio::test]
async fn test_deleting_cache_file_forces_one_more_call() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let query = Query::from("P1");

    fetcher.fetch_single(&query, &lookup()).await.unwrap();
    let keys = fetcher.cache_keys(&query, &lookup()).unwrap();
    assert_eq!(keys.len(), 1);
    assert!(fetcher.cache().remove(&keys[0]).unwrap());

    fetcher.fetch_single(&query, &lookup()).await.unwrap();
    fetcher.fetch_single(&query, &lookup()).await.unwrap();

    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_volatile_options_share_cache_entry() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());

    fetcher.fetch_single(&Query::from("P1"), &lookup()).await.unwrap();
    let again = fetcher
        .fetch_single(&Query::from("P1"), &lookup().with_param("format", json!("xml")).with_parse(true))
        .await
        .unwrap();

    assert_eq!(mock.calls(), 1);
    assert!(again.from_cache);
}

#[tokio::test]
async fn test_group_is_fetched_once_and_cached_per_id() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let group = Query::Group(vec!["P1".into(), "P2".into()]);

    let result = fetcher.fetch_single(&group, &lookup()).await.unwrap();

    assert_eq!(mock.calls(), 1);
    assert_eq!(mock.last_request()["id"], json!("P1,P2"));
    assert_eq!(mock.last_request()["format"], json!("json"));
    assert_eq!(result.raw["P1"], json!([record("P1")]));
    assert_eq!(result.raw["P2"], json!([record("P2")]));

    let single = fetcher.fetch_single(&Query::from("P2"), &lookup()).await.unwrap();
    assert_eq!(mock.calls(), 1, "an id cached by a group is a hit on its own");
    assert!(single.from_cache);
    assert_eq!(single.raw, json!([record("P2")]));
}

#[tokio::test]
async fn test_partially_cached_group_fetches_only_missing_ids() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());

    fetcher.fetch_single(&Query::from("P1"), &lookup()).await.unwrap();
    let result = fetcher
        .fetch_single(&Query::Group(vec!["P1".into(), "P3".into()]), &lookup())
        .await
        .unwrap();

    assert_eq!(mock.calls(), 2);
    assert_eq!(mock.last_request()["id"], json!("P3"));
    assert!(!result.from_cache);
    assert_eq!(result.raw["P1"], json!([record("P1")]));
    assert_eq!(result.raw["P3"], json!([record("P3")]));
}

#[tokio::test]
async fn test_unmatched_subquery_is_empty_and_not_cached() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let group = Query::Group(vec!["P1".into(), "missing9".into()]);

    let result = fetcher.fetch_single(&group, &lookup()).await.unwrap();
    assert_eq!(result.raw["missing9"], json!([]));

    fetcher.fetch_single(&group, &lookup()).await.unwrap();
    assert_eq!(mock.calls(), 2);
    assert_eq!(mock.last_request()["id"], json!("missing9"));
}

#[tokio::test]
async fn test_empty_response_is_not_cached() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());

    let result = fetcher.fetch_single(&Query::from("missing1"), &lookup()).await.unwrap();
    fetcher.fetch_single(&Query::from("missing1"), &lookup()).await.unwrap();

    assert_eq!(result.raw, json!([]));
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_batch_preserves_input_order() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let ids = ["q1", "q2", "q3", "q4", "q5", "q6"];
    for id in ids.iter().step_by(2) {
        fetcher.fetch_single(&Query::from(*id), &lookup()).await.unwrap();
    }
    assert_eq!(mock.calls(), 3);

    let queries: Vec<Query> = ids.iter().map(|id| Query::from(*id)).collect();
    let BatchOutput::Items(items) = fetcher.fetch_batch(&queries, &lookup()).await.unwrap() else {
        panic!("expected items");
    };

    assert_eq!(mock.calls(), 6);
    assert_eq!(items.len(), ids.len());
    for (index, item) in items.iter().enumerate() {
        let result = item.as_ref().expect("every query succeeds");
        assert_eq!(result.raw[0]["id"], json!(ids[index]));
        assert_eq!(result.from_cache, index % 2 == 0);
    }
}

#[tokio::test]
async fn test_batch_isolates_failed_query() {
    let (mock, fetcher, _dir) = setup(MockService::failing_on("bad"), &quiet_config());
    let queries = vec![Query::from("a1"), Query::from("bad"), Query::from("c3")];

    let BatchOutput::Items(items) = fetcher.fetch_batch(&queries, &lookup()).await.unwrap() else {
        panic!("expected items");
    };

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().raw[0]["id"], json!("a1"));
    assert!(matches!(
        items[1],
        Err(Error::Fetch(FetchError::Status { status: 500, .. }))
    ));
    assert_eq!(items[2].as_ref().unwrap().raw[0]["id"], json!("c3"));
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_single_fetch_surfaces_fetch_error() {
    let (_mock, fetcher, _dir) = setup(MockService::failing_on("bad"), &quiet_config());

    let err = fetcher.fetch_single(&Query::from("bad"), &lookup()).await.unwrap_err();

    assert!(matches!(err, Error::Fetch(_)));
}

#[tokio::test]
async fn test_validation_errors_surface_before_any_call() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());

    let err = fetcher
        .fetch_single(&Query::from("P1"), &CallOptions::new("search"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::UnsupportedMethod { .. })));

    let params: Params = serde_json::from_value(json!({"id": "P1", "organism": "9606"})).unwrap();
    let err = fetcher.fetch_single(&Query::Params(params), &lookup()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::UnknownParameter { .. })));

    let err = fetcher.fetch_single(&Query::from(""), &lookup()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::EmptyQuery)));

    let batch = vec![Query::from("P1"), Query::from(" ")];
    assert!(fetcher.fetch_batch(&batch, &lookup()).await.is_err());

    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_batch_of_tables_is_concatenated() {
    let (_mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let queries = vec![Query::from("a1"), Query::from("b2")];
    let opts = CallOptions::new("table").with_table(true);

    let BatchOutput::Table(table) = fetcher.fetch_batch(&queries, &opts).await.unwrap() else {
        panic!("expected a table");
    };

    assert_eq!(table.columns, vec!["id", "name"]);
    assert_eq!(table.rows, vec![vec!["a1", "name-a1"], vec!["b2", "name-b2"]]);
}

#[tokio::test]
async fn test_tabular_entry_is_cached_as_table() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let opts = CallOptions::new("table").with_table(true);

    fetcher.fetch_single(&Query::from("a1"), &opts).await.unwrap();
    let cached = fetcher.fetch_single(&Query::from("a1"), &opts).await.unwrap();

    assert_eq!(mock.calls(), 1);
    let key = &fetcher.cache_keys(&Query::from("a1"), &opts).unwrap()[0];
    let path = fetcher.cache().path_for(key).unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("tsv"));
    assert_eq!(cached.table.unwrap().rows, vec![vec!["a1", "name-a1"]]);
}

#[tokio::test]
async fn test_group_table_has_one_row_per_id() {
    let (_mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let opts = lookup()
        .with_table(true)
        .with_fields(Projection::parse_list("name,score=nested.score"));

    let result = fetcher
        .fetch_single(&Query::Group(vec!["P1".into(), "P2".into()]), &opts)
        .await
        .unwrap();

    let table = result.table.unwrap();
    assert_eq!(table.columns, vec!["id", "name", "score"]);
    assert_eq!(table.rows[0], vec!["P1", "name-P1", "1"]);
    assert_eq!(table.rows[1], vec!["P2", "name-P2", "2"]);
}

#[tokio::test]
async fn test_explicit_fields_project_each_item() {
    let (_mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let opts = lookup().with_fields(Projection::Keep(vec!["id".into(), "nested.score".into()]));

    let result = fetcher.fetch_single(&Query::from("P7"), &opts).await.unwrap();

    assert_eq!(result.parsed, Some(json!([{"id": "P7", "nested.score": 7}])));
    assert_eq!(result.output(), &json!([{"id": "P7", "nested.score": 7}]));
}

#[tokio::test]
async fn test_configured_projection_applies_when_parsing() {
    let mut table = ProjectionTable::new();
    table.insert("lookup", Projection::Keep(vec!["name".into()]));
    table.insert("short", Projection::Keep(vec!["id".into()]));
    let config = EngineConfig {
        projections: BTreeMap::from([("mock".to_string(), table)]),
        ..quiet_config()
    };
    let (_mock, fetcher, _dir) = setup(MockService::new(), &config);

    let by_method = fetcher
        .fetch_single(&Query::from("P1"), &lookup().with_parse(true))
        .await
        .unwrap();
    let by_key = fetcher
        .fetch_single(&Query::from("P1"), &lookup().with_config_key("short"))
        .await
        .unwrap();
    let unparsed = fetcher.fetch_single(&Query::from("P1"), &lookup()).await.unwrap();

    assert_eq!(by_method.parsed, Some(json!([{"name": "name-P1"}])));
    assert_eq!(by_key.parsed, Some(json!([{"id": "P1"}])));
    assert!(unparsed.parsed.is_none());
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_refetched() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    let query = Query::from("P1");

    fetcher.fetch_single(&query, &lookup()).await.unwrap();
    let key = &fetcher.cache_keys(&query, &lookup()).unwrap()[0];
    let path = fetcher.cache().path_for(key).unwrap();
    fs::write(&path, "{not json").unwrap();

    let result = fetcher.fetch_single(&query, &lookup()).await.unwrap();

    assert_eq!(mock.calls(), 2);
    assert!(!result.from_cache);
    assert!(fetcher.cache().read(key).unwrap().is_some(), "entry should be rewritten");
}

fn transport() -> HttpTransport {
    HttpTransport::new(&quiet_config()).expect("Failed to build transport")
}

fn key_for(fetcher: &Fetcher, params: Value, opts: &CallOptions) -> Vec<String> {
    let params: Params = serde_json::from_value(params).unwrap();
    fetcher
        .cache_keys(&Query::Params(params), opts)
        .unwrap()
        .into_iter()
        .map(|key| key.as_str().to_string())
        .collect()
}

#[test]
fn test_different_identity_parameters_never_share_a_key() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let service = Arc::new(BioDbNet::new(transport()).unwrap());
    let fetcher = Fetcher::new(service, CacheStore::with_dir(temp_dir.path()), &quiet_config());
    let db2db = CallOptions::new("db2db");
    let getpathways = CallOptions::new("getpathways");

    assert_ne!(
        key_for(&fetcher, json!({"inputValues": "TP53", "input": "9606"}), &db2db),
        key_for(&fetcher, json!({"inputValues": "TP53", "taxonId": "9606"}), &db2db)
    );
    assert_ne!(
        key_for(&fetcher, json!({"taxonId": "9606"}), &getpathways),
        key_for(&fetcher, json!({"pathways": "9606"}), &getpathways)
    );
}

#[test]
fn test_explicit_default_shares_key_with_omitted_default() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let service = Arc::new(BioDbNet::new(transport()).unwrap());
    let fetcher = Fetcher::new(service, CacheStore::with_dir(temp_dir.path()), &quiet_config());
    let db2db = CallOptions::new("db2db");

    let outputs = bioquery::services::biodbnet::DEFAULT_OUTPUTS;

    let omitted = key_for(&fetcher, json!({"inputValues": "TP53", "input": "genesymbol"}), &db2db);
    let explicit = key_for(
        &fetcher,
        json!({"inputValues": "TP53", "input": "genesymbol", "outputs": outputs}),
        &db2db,
    );
    let grouped = key_for(
        &fetcher,
        json!({"inputValues": ["TP53", "BRCA1"], "input": "genesymbol"}),
        &db2db,
    );

    assert_eq!(omitted, explicit);
    assert_eq!(grouped.len(), 2);
    assert!(grouped.contains(&omitted[0]), "a sub-query shares the key of the same lone query");
}

#[tokio::test]
async fn test_unsupported_option_fails_batch_before_any_call() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let kegg = Arc::new(Kegg::new(transport()).unwrap());
    let fetcher = Fetcher::new(kegg, CacheStore::with_dir(temp_dir.path()), &EngineConfig::default());
    let started = Instant::now();

    let queries = vec![Query::from("hsa:1"), Query::from("hsa:2")];
    let err = fetcher
        .fetch_batch(&queries, &CallOptions::new("get").with_option("pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::UnsupportedValue { .. })));

    let bad_db = CallOptions::new("get").with_param("db", json!("nope"));
    let err = fetcher.fetch_single(&Query::from("hsa:1"), &bad_db).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::UnsupportedValue { .. })));

    // no request went out, so no rate-limit pause either
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_service_validation_runs_before_cache_and_network() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());

    let batch = vec![Query::from("P1"), Query::from("forbidden")];
    let err = fetcher.fetch_batch(&batch, &lookup()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::UnsupportedValue { .. })));

    let ok = fetcher
        .fetch_single(&Query::from("P1"), &lookup().with_option("brief"))
        .await;
    assert!(ok.is_ok());
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_batch_never_exceeds_worker_limit() {
    let config = EngineConfig {
        max_workers: 2,
        ..quiet_config()
    };
    let (mock, fetcher, _dir) = setup(MockService::new(), &config);
    let queries: Vec<Query> = ["w1", "w2", "w3", "w4", "w5", "w6"]
        .iter()
        .map(|id| Query::from(*id))
        .collect();

    fetcher.fetch_batch(&queries, &lookup()).await.unwrap();

    assert_eq!(mock.calls(), 6);
    assert_eq!(mock.peak(), 2);
}

#[tokio::test]
async fn test_every_call_is_followed_by_the_pause() {
    let config = EngineConfig {
        max_workers: 1,
        min_wait_ms: 60,
        max_wait_ms: 60,
        ..EngineConfig::default()
    };
    let (mock, fetcher, _dir) = setup(MockService::failing_on("bad"), &config);
    let queries = vec![Query::from("a1"), Query::from("bad"), Query::from("c3")];
    let started = Instant::now();

    fetcher.fetch_batch(&queries, &lookup()).await.unwrap();

    assert_eq!(mock.calls(), 3);
    assert!(started.elapsed() >= Duration::from_millis(60 * 3));
}

#[tokio::test]
async fn test_failed_single_call_still_pauses() {
    let config = EngineConfig {
        min_wait_ms: 80,
        max_wait_ms: 80,
        ..EngineConfig::default()
    };
    let (_mock, fetcher, _dir) = setup(MockService::failing_on("bad"), &config);
    let started = Instant::now();

    assert!(fetcher.fetch_single(&Query::from("bad"), &lookup()).await.is_err());

    assert!(started.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_cached_group_in_batch_is_answered_without_calls() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    fetcher
        .fetch_single(&Query::Group(vec!["P1".into(), "P2".into()]), &lookup())
        .await
        .unwrap();
    assert_eq!(mock.calls(), 1);

    let queries = vec![
        Query::Group(vec!["P2".into(), "P1".into()]),
        Query::Group(vec!["P1".into()]),
    ];
    let BatchOutput::Items(items) = fetcher.fetch_batch(&queries, &lookup()).await.unwrap() else {
        panic!("expected items");
    };

    assert_eq!(mock.calls(), 1);
    for item in &items {
        let result = item.as_ref().expect("cached group succeeds");
        assert!(result.from_cache);
        assert_eq!(result.raw["P1"], json!([record("P1")]));
    }
}

#[tokio::test]
async fn test_partially_cached_group_in_batch_makes_one_merged_call() {
    let (mock, fetcher, _dir) = setup(MockService::new(), &quiet_config());
    fetcher.fetch_single(&Query::from("P1"), &lookup()).await.unwrap();

    let queries = vec![
        Query::Group(vec!["P1".into(), "P3".into()]),
        Query::Group(vec!["P4".into(), "P5".into()]),
    ];
    let BatchOutput::Items(items) = fetcher.fetch_batch(&queries, &lookup()).await.unwrap() else {
        panic!("expected items");
    };

    assert_eq!(mock.calls(), 3);
    let requested = mock.requested_ids();
    assert!(requested.contains(&"P3".to_string()));
    assert!(requested.contains(&"P4,P5".to_string()));

    let first = items[0].as_ref().unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.raw["P1"], json!([record("P1")]));
    assert_eq!(first.raw["P3"], json!([record("P3")]));
    assert_eq!(items[1].as_ref().unwrap().raw["P5"], json!([record("P5")]));
}
