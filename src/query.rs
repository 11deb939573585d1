//! Query shapes accepted by the fetch engine
//!
//! Callers hand in a bare identifier, a group of identifiers or a parameter map.
//! The shape is resolved once, against the method spec, into a parameter map.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::method::{MethodSpec, ParamType, ValidationError};

/// Parameter map; ordered so serialization is stable
pub type Params = BTreeMap<String, Value>;

/// A single logical request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// One identifier, bound to the first identity parameter
    Scalar(String),
    /// Several identifiers requested together
    Group(Vec<String>),
    /// Explicit parameters; values may be scalars, sequences or maps
    Params(Params),
}

impl Query {
    /// Whether the query names nothing at all
    ///
    /// A parameter map is never considered empty here: defaults and extra
    /// options may still supply its identity parameters.
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Scalar(id) => id.trim().is_empty(),
            Query::Group(ids) => ids.iter().all(|id| id.trim().is_empty()),
            Query::Params(_) => false,
        }
    }

    /// Resolves the query into raw parameters for `spec`
    ///
    /// Scalars bind to the first identity parameter, wrapped in a list when
    /// that parameter is list-typed. Groups bind to the first
    /// groupable identity parameter, or the first identity parameter when the
    /// method groups nothing. List values are kept intact for decomposition.
    pub fn to_params(&self, spec: &MethodSpec) -> Result<Params, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        match self {
            Query::Params(params) => Ok(params.clone()),
            Query::Scalar(id) => {
                let name = first_identity(spec)?;
                let value = match spec.param_spec(&name).map(|p| p.ty) {
                    Some(ParamType::List) => Value::Array(vec![Value::String(id.clone())]),
                    _ => Value::String(id.clone()),
                };
                Ok(Params::from([(name, value)]))
            }
            Query::Group(ids) => {
                let name = match spec
                    .groupable
                    .iter()
                    .find(|name| spec.param_spec(name).is_some_and(|p| p.identity))
                {
                    Some(name) => name.clone(),
                    None => first_identity(spec)?,
                };
                let values = ids.iter().cloned().map(Value::String).collect();
                Ok(Params::from([(name, Value::Array(values))]))
            }
        }
    }
}

fn first_identity(spec: &MethodSpec) -> Result<String, ValidationError> {
    spec.identity_names()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ValidationError::MissingIdentity(String::new()))
}

impl From<&str> for Query {
    fn from(id: &str) -> Self {
        Query::Scalar(id.to_string())
    }
}

impl From<String> for Query {
    fn from(id: String) -> Self {
        Query::Scalar(id)
    }
}

impl From<Vec<String>> for Query {
    fn from(ids: Vec<String>) -> Self {
        Query::Group(ids)
    }
}

impl From<Params> for Query {
    fn from(params: Params) -> Self {
        Query::Params(params)
    }
}
