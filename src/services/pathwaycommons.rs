//! Pathway Commons adapter
//!
//! Every method is a POST of the prepared parameters as a JSON body to
//! `<base>/<method>`. Search answers wrap their hits in `searchHit`, graph
//! answers in `@graph`; both are unwrapped to the list of records.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::cache::Payload;
use crate::method::{HttpVerb, MethodSpec, ParamType, SpecError, SpecRegistry, ValidationError};
use crate::query::Params;
use crate::service::{PreparedRequest, Service};
use crate::transport::{query_pairs, FetchError, HttpTransport};

pub const PATHWAYCOMMONS_API_URL: &str = "https://www.pathwaycommons.org/pc2";

/// Output formats the adapter can decode
pub const JSON_FORMATS: &[&str] = &["jsonld"];

/// Accepted `direction` values for `neighborhood`
pub const DIRECTIONS: &[&str] = &["undirected", "bothstream", "upstream", "downstream"];

pub struct PathwayCommons {
    transport: HttpTransport,
    base_url: String,
    specs: SpecRegistry,
}

impl PathwayCommons {
    pub fn new(transport: HttpTransport) -> Result<Self, SpecError> {
        Self::with_base_url(transport, PATHWAYCOMMONS_API_URL)
    }

    pub fn with_base_url(transport: HttpTransport, base_url: impl Into<String>) -> Result<Self, SpecError> {
        let specs = SpecRegistry::new()
            .with(
                "fetch",
                None,
                MethodSpec::post()
                    .identity("uri", ParamType::List, None)
                    .param("format", ParamType::Str, Some(json!("jsonld")))
                    .param("pattern", ParamType::List, Some(json!(["interacts-with"])))
                    .param("subpw", ParamType::Bool, Some(json!(false))),
            )?
            .with(
                "top_pathways",
                None,
                MethodSpec::post()
                    .identity("q", ParamType::Str, None)
                    .param("organism", ParamType::List, None)
                    .param("datasource", ParamType::List, None),
            )?
            .with(
                "neighborhood",
                None,
                MethodSpec::post()
                    .identity("source", ParamType::List, None)
                    .param("limit", ParamType::Int, Some(json!(1)))
                    .param("format", ParamType::Str, Some(json!("jsonld")))
                    .param("organism", ParamType::List, None)
                    .param("datasource", ParamType::List, None)
                    .param("pattern", ParamType::List, Some(json!(["interacts-with"])))
                    .param("subpw", ParamType::Bool, Some(json!(false)))
                    .param("direction", ParamType::Str, Some(json!("undirected"))),
            )?;

        Ok(Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            specs,
        })
    }
}

#[async_trait]
impl Service for PathwayCommons {
    fn name(&self) -> &str {
        "pathwaycommons"
    }

    fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    fn validate_query(&self, _method: &str, params: &Params) -> Result<(), ValidationError> {
        check_choice(params, "format", JSON_FORMATS)?;
        check_choice(params, "direction", DIRECTIONS)
    }

    async fn fetch(&self, request: &PreparedRequest) -> Result<Payload, FetchError> {
        let url = format!("{}/{}", self.base_url, request.method);
        let params = request.query_params();

        let response = match request.verb {
            HttpVerb::Post => {
                let body: Map<String, Value> = params.into_iter().collect();
                self.transport.post_json(&url, &Value::Object(body)).await?
            }
            HttpVerb::Get => self.transport.get_json(&url, &query_pairs(&params)).await?,
        };
        Ok(Payload::Json(unwrap_hits(response)))
    }
}

fn check_choice(params: &Params, name: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    match params.get(name).and_then(Value::as_str) {
        Some(value) if !allowed.contains(&value) => Err(ValidationError::UnsupportedValue {
            name: name.to_string(),
            value: value.to_string(),
            expected: allowed.join(", "),
        }),
        _ => Ok(()),
    }
}

/// Strips the `searchHit` or `@graph` wrapper from a response
pub fn unwrap_hits(response: Value) -> Value {
    match response {
        Value::Object(mut map) => {
            if let Some(hits) = map.remove("searchHit") {
                hits
            } else if let Some(graph) = map.remove("@graph") {
                graph
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}
