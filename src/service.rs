//! Collaborator interface implemented by each remote service adapter

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::Payload;
use crate::method::{HttpVerb, SpecRegistry, ValidationError};
use crate::project::{project_one, Projection};
use crate::query::Params;
use crate::transport::FetchError;

/// A validated call, ready to go on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub option: Option<String>,
    pub verb: HttpVerb,
    /// Parameter carried in the URL path, when the method declares one
    pub path_param: Option<String>,
    /// Wire parameters; grouped lists are already joined
    pub params: Params,
}

impl PreparedRequest {
    /// Value of the path parameter, rendered as text
    pub fn path_value(&self) -> Option<String> {
        let name = self.path_param.as_ref()?;
        self.params.get(name).map(crate::table::cell_text)
    }

    /// Wire parameters minus the path parameter
    pub fn query_params(&self) -> Params {
        let mut params = self.params.clone();
        if let Some(name) = &self.path_param {
            params.remove(name);
        }
        params
    }
}

/// One remote database
///
/// The engine owns caching, decomposition and projection; an adapter only
/// knows its method specs and how to perform a single prepared call.
#[async_trait]
pub trait Service: Send + Sync {
    /// Short name, also used as the cache subdirectory
    fn name(&self) -> &str;

    fn specs(&self) -> &SpecRegistry;

    /// Service-specific checks on a query's parameters
    ///
    /// Runs before any cache lookup or network call, after the generic
    /// name and type checks have passed.
    fn validate_query(&self, _method: &str, _params: &Params) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Performs one network call
    ///
    /// Returns the decoded response: JSON for structured services, a table
    /// for services answering in delimited text.
    async fn fetch(&self, request: &PreparedRequest) -> Result<Payload, FetchError>;

    /// Reshapes one raw item; path-based projection unless overridden
    fn parse_one(&self, item: &Value, projection: Option<&Projection>) -> Value {
        project_one(item, projection)
    }

    /// Extra option names that never contribute to cache keys
    fn cache_ignore_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Parameters used to match split items; `None` means all of them
    fn match_keys(&self) -> Option<Vec<String>> {
        None
    }
}
