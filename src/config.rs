//! Engine configuration
//!
//! Every field has a default so an empty file, or no file at all, is a valid
//! configuration. Command-line flags override individual fields after loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::method::SpecRegistry;
use crate::project::Projection;
use crate::transport::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Named field projections for one service
///
/// Keys are either explicit config keys chosen by the caller, or
/// `method`/`method_option` registry keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectionTable(BTreeMap<String, Projection>);

impl ProjectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, projection: Projection) {
        self.0.insert(key.into(), projection);
    }

    pub fn get(&self, key: &str) -> Option<&Projection> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds the projection for a call
    ///
    /// Tries the explicit `config_key` first, then `method_option`, then
    /// `method` alone.
    pub fn resolve(&self, config_key: Option<&str>, method: &str, option: Option<&str>) -> Option<&Projection> {
        if let Some(found) = config_key.and_then(|key| self.get(key)) {
            return Some(found);
        }
        self.get(&SpecRegistry::spec_key(method, option))
            .or_else(|| self.get(method))
    }
}

/// Settings shared by the fetch engine, transport and adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Concurrent network fetches in a batch
    pub max_workers: usize,
    /// Lower bound of the pause after each service call
    pub min_wait_ms: u64,
    /// Upper bound of the pause after each service call
    pub max_wait_ms: u64,
    /// Retries for transient HTTP failures
    pub total_retries: u32,
    pub backoff_base_ms: u64,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    /// Cache root; services get one subdirectory each
    pub cache_dir: Option<PathBuf>,
    /// Projection tables keyed by service name
    pub projections: BTreeMap<String, ProjectionTable>,
    /// API keys and similar, keyed by name
    pub credentials: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            min_wait_ms: 1000,
            max_wait_ms: 2000,
            total_retries: 5,
            backoff_base_ms: 250,
            connect_timeout_secs: 10,
            timeout_secs: 60,
            cache_dir: None,
            projections: BTreeMap::new(),
            credentials: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_workers",
                reason: "must be > 0".to_string(),
            });
        }
        if self.min_wait_ms > self.max_wait_ms {
            return Err(ConfigError::InvalidValue {
                field: "min_wait_ms",
                reason: format!("must be <= max_wait_ms ({})", self.max_wait_ms),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            total_retries: self.total_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }

    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name).map(String::as_str)
    }

    /// Projection table for `service`, empty when none is configured
    pub fn projections_for(&self, service: &str) -> ProjectionTable {
        self.projections.get(service).cloned().unwrap_or_default()
    }

    /// Cache directory for `service`, if a root was configured
    pub fn service_cache_dir(&self, service: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|root| root.join(service))
    }
}
