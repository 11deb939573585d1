//! bioquery - cached, batched lookups against biological web services
//!
//! Resolves the service, runs the query through the fetch engine and prints
//! JSON, or tab-separated rows for tabular results.

use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bioquery::cli::{Cli, Request, RunConfig};
use bioquery::config::EngineConfig;
use bioquery::fetcher::{BatchOutput, FetchResult, Fetcher};
use bioquery::project::field_paths;
use bioquery::services::ServiceRegistry;

/// Logs go to stderr so stdout stays parseable
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_fields(value: &Value) {
    for (path, kind) in field_paths(value) {
        println!("{}\t{}", path, kind);
    }
}

fn print_result(result: &FetchResult, list_fields: bool) -> Result<(), Box<dyn std::error::Error>> {
    if list_fields {
        print_fields(result.output());
        return Ok(());
    }
    match &result.table {
        Some(table) => print!("{}", table.to_tsv()?),
        None => print_json(result.output())?,
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let run = RunConfig::from_cli(&cli)?;

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    RunConfig::apply_overrides(&cli, &mut config);
    config.validate()?;

    let registry = ServiceRegistry::with_defaults(&config)?;
    let service = registry.get(&run.service)?;
    let fetcher = Fetcher::for_service(service, &config)?;

    match &run.request {
        Request::Single(query) => {
            let result = fetcher.fetch_single(query, &run.options).await?;
            print_result(&result, run.list_fields)?;
        }
        Request::Batch(queries) => match fetcher.fetch_batch(queries, &run.options).await? {
            BatchOutput::Table(table) if !run.list_fields => print!("{}", table.to_tsv()?),
            BatchOutput::Table(table) => print_fields(&Value::Array(table.to_records())),
            BatchOutput::Items(items) if run.list_fields => {
                if let Some(first) = items.iter().find_map(|item| item.as_ref().ok()) {
                    print_fields(first.output());
                }
            }
            BatchOutput::Items(items) => {
                let slots: Vec<Value> = items
                    .iter()
                    .map(|item| match item {
                        Ok(result) => result.output().clone(),
                        Err(err) => json!({"error": err.to_string()}),
                    })
                    .collect();
                print_json(&Value::Array(slots))?;
            }
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
