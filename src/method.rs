//! Method specifications and parameter preparation
//!
//! Every service operation is described by a `MethodSpec`: its HTTP verb, its
//! parameters (type, default, whether they identify the requested entity) and
//! which identity parameters can be joined into one wire request. Specs are
//! validated when registered; `prepare` turns raw parameters into wire
//! parameters for one call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::query::Params;
use crate::table::cell_text;

/// Inconsistent method specification, detected at registration time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// No parameter is marked as identity
    #[error("method '{method}' declares no identity parameter")]
    NoIdentity { method: String },

    /// A groupable name does not match any declared parameter
    #[error("method '{method}' groups undeclared parameter '{param}'")]
    UnknownGroupable { method: String, param: String },

    /// A groupable parameter is not an identity parameter
    #[error("method '{method}' groups non-identity parameter '{param}'")]
    GroupableNotIdentity { method: String, param: String },

    /// Groupable parameters without a join separator
    #[error("method '{method}' groups parameters but declares no separator")]
    MissingSeparator { method: String },
}

/// Malformed query or unsupported operation, reported straight to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The query names nothing
    #[error("query is empty")]
    EmptyQuery,

    /// No spec registered for the requested method/option
    #[error("unsupported method '{method}'; available: {available}")]
    UnsupportedMethod { method: String, available: String },

    /// A supplied parameter is not declared by the method
    #[error("unknown parameter '{name}'; expected one of: {expected}")]
    UnknownParameter { name: String, expected: String },

    /// A supplied parameter has the wrong type
    #[error("parameter '{name}' should be of type {expected}, got {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// None of the identity parameters is present
    #[error("no identity parameter supplied; expected one of: {0}")]
    MissingIdentity(String),

    /// A value outside the set the service accepts
    #[error("invalid {name} '{value}'; expected one of: {expected}")]
    UnsupportedValue {
        name: String,
        value: String,
        expected: String,
    },
}

/// HTTP verb used by a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
}

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Map,
}

impl ParamType {
    /// Whether `value` has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::Str => value.is_string(),
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_number(),
            ParamType::Bool => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Map => value.is_object(),
        }
    }

    /// Name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Map => "map",
        }
    }

    fn is_scalar(self) -> bool {
        !matches!(self, ParamType::List | ParamType::Map)
    }
}

/// Type label of a JSON value, matching `ParamType::name`
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub ty: ParamType,
    pub default: Option<Value>,
    /// Whether the value identifies the requested entity
    pub identity: bool,
}

/// Declarative description of one service operation
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    pub verb: HttpVerb,
    /// Parameter whose value goes into the URL path instead of the query string
    pub path_param: Option<String>,
    /// Parameters in declaration order
    pub parameters: Vec<(String, ParamSpec)>,
    /// Identity parameters whose lists can be joined into one wire request
    pub groupable: Vec<String>,
    /// Separator used when joining groupable lists
    pub separator: Option<String>,
    /// Variants served by this spec when none has its own
    pub options: Vec<String>,
}

impl MethodSpec {
    pub fn new(verb: HttpVerb) -> Self {
        Self {
            verb,
            path_param: None,
            parameters: Vec::new(),
            groupable: Vec::new(),
            separator: None,
            options: Vec::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(HttpVerb::Get)
    }

    pub fn post() -> Self {
        Self::new(HttpVerb::Post)
    }

    pub fn path_param(mut self, name: &str) -> Self {
        self.path_param = Some(name.to_string());
        self
    }

    /// Declares a non-identity parameter
    pub fn param(self, name: &str, ty: ParamType, default: Option<Value>) -> Self {
        self.declare(name, ty, default, false)
    }

    /// Declares an identity parameter
    pub fn identity(self, name: &str, ty: ParamType, default: Option<Value>) -> Self {
        self.declare(name, ty, default, true)
    }

    fn declare(mut self, name: &str, ty: ParamType, default: Option<Value>, identity: bool) -> Self {
        self.parameters.retain(|(existing, _)| existing != name);
        self.parameters.push((
            name.to_string(),
            ParamSpec {
                ty,
                default,
                identity,
            },
        ));
        self
    }

    /// Marks parameters as groupable, joined on the wire with `separator`
    pub fn group_by(mut self, names: &[&str], separator: &str) -> Self {
        self.groupable = names.iter().map(|name| name.to_string()).collect();
        self.separator = Some(separator.to_string());
        self
    }

    /// Declares the variants this spec also serves
    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|option| option.to_string()).collect();
        self
    }

    pub fn accepts_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, spec)| spec)
    }

    /// Identity parameter names in declaration order
    pub fn identity_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.identity)
            .map(|(name, _)| name.as_str())
    }

    pub fn is_groupable(&self, name: &str) -> bool {
        self.groupable.iter().any(|g| g == name)
    }

    /// Checks the spec's internal consistency
    pub fn validate(&self, method: &str) -> Result<(), SpecError> {
        if self.identity_names().next().is_none() {
            return Err(SpecError::NoIdentity {
                method: method.to_string(),
            });
        }
        for name in &self.groupable {
            match self.param_spec(name) {
                None => {
                    return Err(SpecError::UnknownGroupable {
                        method: method.to_string(),
                        param: name.clone(),
                    })
                }
                Some(spec) if !spec.identity => {
                    return Err(SpecError::GroupableNotIdentity {
                        method: method.to_string(),
                        param: name.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        if !self.groupable.is_empty() && self.separator.is_none() {
            return Err(SpecError::MissingSeparator {
                method: method.to_string(),
            });
        }
        Ok(())
    }

    fn parameter_names(&self) -> String {
        self.parameters
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Method specs of one service, keyed by method and optional variant
#[derive(Debug, Clone, Default)]
pub struct SpecRegistry {
    specs: BTreeMap<String, MethodSpec>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry key: `method` or `method_option`
    pub fn spec_key(method: &str, option: Option<&str>) -> String {
        match option {
            Some(option) if !option.is_empty() => format!("{}_{}", method, option),
            _ => method.to_string(),
        }
    }

    /// Validates and stores `spec`, replacing any spec under the same key
    pub fn register(
        &mut self,
        method: &str,
        option: Option<&str>,
        spec: MethodSpec,
    ) -> Result<(), SpecError> {
        let key = Self::spec_key(method, option);
        spec.validate(&key)?;
        self.specs.insert(key, spec);
        Ok(())
    }

    /// Builder form of `register`
    pub fn with(mut self, method: &str, option: Option<&str>, spec: MethodSpec) -> Result<Self, SpecError> {
        self.register(method, option, spec)?;
        Ok(self)
    }

    /// Looks up the spec for `method`/`option`
    ///
    /// A variant without its own spec falls back to the method's spec, but
    /// only when that spec lists the variant among its options.
    pub fn resolve(&self, method: &str, option: Option<&str>) -> Result<&MethodSpec, ValidationError> {
        let key = Self::spec_key(method, option);
        if let Some(spec) = self.specs.get(&key) {
            return Ok(spec);
        }
        match (self.specs.get(method), option) {
            (Some(spec), None) => Ok(spec),
            (Some(spec), Some(option)) if option.is_empty() || spec.accepts_option(option) => Ok(spec),
            (Some(spec), Some(option)) => Err(ValidationError::UnsupportedValue {
                name: format!("{} option", method),
                value: option.to_string(),
                expected: spec.options.join(", "),
            }),
            (None, _) => Err(ValidationError::UnsupportedMethod {
                method: key,
                available: self.methods().collect::<Vec<_>>().join(", "),
            }),
        }
    }

    /// Registered keys
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

/// Produces validated wire parameters for one call
///
/// Rejects undeclared names and mistyped values, fills in defaults and joins
/// lists given for groupable parameters with the method's separator.
pub fn prepare(params: &Params, spec: &MethodSpec) -> Result<Params, ValidationError> {
    let mut wire = Params::new();

    for (name, value) in params {
        let Some(param) = spec.param_spec(name) else {
            return Err(ValidationError::UnknownParameter {
                name: name.clone(),
                expected: spec.parameter_names(),
            });
        };

        let joined = match value {
            Value::Array(items) if spec.is_groupable(name) && param.ty.is_scalar() => {
                if let Some(bad) = items.iter().find(|item| !param.ty.accepts(item)) {
                    return Err(ValidationError::WrongType {
                        name: name.clone(),
                        expected: param.ty.name(),
                        found: value_type_name(bad),
                    });
                }
                let separator = spec.separator.as_deref().unwrap_or(",");
                let parts: Vec<String> = items.iter().map(cell_text).collect();
                Value::String(parts.join(separator))
            }
            other if param.ty.accepts(other) => other.clone(),
            other => {
                return Err(ValidationError::WrongType {
                    name: name.clone(),
                    expected: param.ty.name(),
                    found: value_type_name(other),
                })
            }
        };
        wire.insert(name.clone(), joined);
    }

    for (name, param) in &spec.parameters {
        if let (false, Some(default)) = (wire.contains_key(name), &param.default) {
            wire.insert(name.clone(), default.clone());
        }
    }

    if !spec.identity_names().any(|name| wire.contains_key(name)) {
        return Err(ValidationError::MissingIdentity(
            spec.identity_names().collect::<Vec<_>>().join(", "),
        ));
    }

    Ok(wire)
}
