//! Command-line interface parsing for bioquery
//!
//! Turns arguments into the queries and call options handed to the fetch
//! engine, plus the engine settings the flags override.

use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::fetcher::CallOptions;
use crate::project::Projection;
use crate::query::{Params, Query};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// A `--param` value is not `key=value`, `key=[a,b]` or `key:=json`
    #[error("Invalid parameter: '{0}'. Expected key=value, key=[a,b] or key:=<json>")]
    InvalidParam(String),
}

/// bioquery - cached lookups against biological databases
#[derive(Parser, Debug)]
#[command(name = "bioquery")]
#[command(about = "Cached, batched queries against biological web services")]
#[command(version)]
pub struct Cli {
    /// Service to query (kegg, biodbnet, pathwaycommons)
    pub service: String,

    /// Service operation, e.g. `get` or `db2db`
    pub method: String,

    /// Identifiers to look up; several identifiers run as a batch
    pub ids: Vec<String>,

    /// Operation variant, e.g. `aaseq` for KEGG `get`
    #[arg(long)]
    pub option: Option<String>,

    /// Send all identifiers as one grouped query instead of a batch
    #[arg(long)]
    pub group: bool,

    /// Extra parameter; repeatable
    ///
    /// Examples:
    ///   --param taxonId=9606          # string
    ///   --param inputValues=[TP53,BRCA1]   # list of strings
    ///   --param limit:=10             # raw JSON
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Reshape responses (implied by --fields and --config-key)
    #[arg(long)]
    pub parse: bool,

    /// Print tab-separated rows instead of JSON
    #[arg(long)]
    pub table: bool,

    /// Fields to keep, comma separated; `name=path` renames
    #[arg(long, value_name = "FIELDS")]
    pub fields: Option<String>,

    /// Named projection from the configuration file
    #[arg(long, value_name = "KEY")]
    pub config_key: Option<String>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache root directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Concurrent network fetches in a batch
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Minimum pause after each service call, in milliseconds
    #[arg(long, value_name = "MS")]
    pub min_wait: Option<u64>,

    /// Maximum pause after each service call, in milliseconds
    #[arg(long, value_name = "MS")]
    pub max_wait: Option<u64>,

    /// List the field paths of the result instead of printing it
    #[arg(long)]
    pub list_fields: bool,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

/// What the CLI asks the engine for
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Single(Query),
    Batch(Vec<Query>),
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub service: String,
    pub request: Request,
    pub options: CallOptions,
    pub list_fields: bool,
}

/// Parses one `--param` argument
///
/// # Arguments
/// * `s` - `key=value`, `key=[a,b]` or `key:=<json>`
///
/// # Returns
/// * `Ok((name, value))` with a string, list of strings or raw JSON value
/// * `Err(CliError::InvalidParam)` if the argument is malformed
pub fn parse_param_arg(s: &str) -> Result<(String, Value), CliError> {
    let invalid = || CliError::InvalidParam(s.to_string());

    let (name, raw) = s.split_once('=').ok_or_else(invalid)?;
    if let Some(name) = name.strip_suffix(':') {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        let value = serde_json::from_str(raw.trim()).map_err(|_| invalid())?;
        return Ok((name.to_string(), value));
    }

    let name = name.trim();
    if name.is_empty() {
        return Err(invalid());
    }

    let raw = raw.trim();
    let value = match raw.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        Some(inner) => Value::Array(
            inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        None => Value::String(raw.to_string()),
    };
    Ok((name.to_string(), value))
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// Without identifiers the parameters form the query itself; with
    /// identifiers they apply to every query.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut params = Params::new();
        for arg in &cli.params {
            let (name, value) = parse_param_arg(arg)?;
            params.insert(name, value);
        }

        let mut options = CallOptions::new(cli.method.clone()).with_parse(cli.parse).with_table(cli.table);
        if let Some(option) = &cli.option {
            options = options.with_option(option.clone());
        }
        if let Some(fields) = &cli.fields {
            options = options.with_fields(Projection::parse_list(fields));
        }
        if let Some(key) = &cli.config_key {
            options = options.with_config_key(key.clone());
        }

        let request = match cli.ids.as_slice() {
            [] => Request::Single(Query::Params(params)),
            ids => {
                options.extra = params;
                match ids {
                    [id] => Request::Single(Query::Scalar(id.clone())),
                    _ if cli.group => Request::Single(Query::Group(ids.to_vec())),
                    _ => Request::Batch(ids.iter().cloned().map(Query::Scalar).collect()),
                }
            }
        };

        Ok(RunConfig {
            service: cli.service.clone(),
            request,
            options,
            list_fields: cli.list_fields,
        })
    }

    /// Applies flag overrides on top of a loaded configuration
    pub fn apply_overrides(cli: &Cli, config: &mut EngineConfig) {
        if let Some(workers) = cli.workers {
            config.max_workers = workers;
        }
        if let Some(min_wait) = cli.min_wait {
            config.min_wait_ms = min_wait;
        }
        if let Some(max_wait) = cli.max_wait {
            config.max_wait_ms = max_wait;
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
    }
}
