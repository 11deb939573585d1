//! bioquery library
//!
//! A request cache and query decomposition engine for biological web
//! services. Service adapters describe their operations declaratively; the
//! engine validates queries, splits grouped identifiers into independently
//! cached sub-queries, merges cache misses into single network calls and
//! projects responses into flat records or tables.

pub mod cache;
pub mod cli;
pub mod config;
pub mod decompose;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod method;
pub mod project;
pub mod query;
pub mod service;
pub mod services;
pub mod split;
pub mod table;
pub mod transport;

pub use cache::{CacheEntry, CacheError, CacheStore, Payload};
pub use config::{EngineConfig, ProjectionTable};
pub use error::{Error, Result};
pub use fetcher::{BatchOutput, CallOptions, FetchResult, Fetcher};
pub use method::{MethodSpec, ParamType, SpecError, SpecRegistry, ValidationError};
pub use project::Projection;
pub use query::{Params, Query};
pub use service::{PreparedRequest, Service};
pub use transport::{FetchError, HttpTransport, RetryPolicy};
