//! bioDBnet REST adapter
//!
//! Every method is a GET on one JSON endpoint with the operation passed as the
//! `method` query parameter.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cache::Payload;
use crate::method::{MethodSpec, ParamType, SpecError, SpecRegistry};
use crate::service::{PreparedRequest, Service};
use crate::transport::{query_pairs, FetchError, HttpTransport};

pub const BIODBNET_API_URL: &str = "https://biodbnet-abcc.ncifcrf.gov/webServices/rest.php/biodbnetRestApi.json";

/// Outputs requested by `db2db` unless the caller names others
pub const DEFAULT_OUTPUTS: &str =
    "genesymbol,affyid,go-biologicalprocess,go-cellularcomponent,go-molecularfunction,goid";

pub struct BioDbNet {
    transport: HttpTransport,
    url: String,
    specs: SpecRegistry,
}

impl BioDbNet {
    pub fn new(transport: HttpTransport) -> Result<Self, SpecError> {
        Self::with_url(transport, BIODBNET_API_URL)
    }

    pub fn with_url(transport: HttpTransport, url: impl Into<String>) -> Result<Self, SpecError> {
        let specs = SpecRegistry::new()
            .with(
                "getpathways",
                None,
                MethodSpec::get()
                    .identity("pathways", ParamType::Str, Some(Value::String("1".into())))
                    .identity("taxonId", ParamType::Str, None),
            )?
            .with(
                "db2db",
                None,
                MethodSpec::get()
                    .identity("inputValues", ParamType::Str, None)
                    .identity("input", ParamType::Str, None)
                    .identity("outputs", ParamType::Str, Some(Value::String(DEFAULT_OUTPUTS.into())))
                    .identity("taxonId", ParamType::Str, None)
                    .group_by(&["inputValues"], ","),
            )?;

        Ok(Self {
            transport,
            url: url.into(),
            specs,
        })
    }
}

#[async_trait]
impl Service for BioDbNet {
    fn name(&self) -> &str {
        "biodbnet"
    }

    fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    async fn fetch(&self, request: &PreparedRequest) -> Result<Payload, FetchError> {
        let mut query = query_pairs(&request.params);
        query.push(("method".to_string(), request.method.clone()));

        let response = self.transport.get_json(&self.url, &query).await?;
        match request.method.as_str() {
            "db2db" => Ok(Payload::Json(Value::Array(unwrap_db2db(response)?))),
            _ => Ok(Payload::Json(response)),
        }
    }

    fn match_keys(&self) -> Option<Vec<String>> {
        Some(vec!["inputValues".to_string()])
    }
}

/// Flattens a `db2db` response into one record per input value
///
/// The service answers with an object of numbered entries, each holding the
/// input value and an `outputs` object. Each record is the `outputs` object
/// with the input value added under `InputValue`.
pub fn unwrap_db2db(response: Value) -> Result<Vec<Value>, FetchError> {
    let entries = match response {
        Value::Object(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => return Ok(items),
        other => {
            return Err(FetchError::Decode(format!(
                "expected a db2db object, got {}",
                other
            )))
        }
    };

    let records = entries
        .into_iter()
        .filter_map(|(_, entry)| {
            let Value::Object(mut entry) = entry else {
                return None;
            };
            let mut record = match entry.remove("outputs") {
                Some(Value::Object(outputs)) => outputs,
                _ => Map::new(),
            };
            if let Some(input) = entry.remove("InputValue") {
                record.insert("InputValue".to_string(), input);
            }
            Some(Value::Object(record))
        })
        .collect();
    Ok(records)
}
