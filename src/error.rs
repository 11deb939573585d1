//! Crate-level error type

use thiserror::Error;

use crate::config::ConfigError;
use crate::method::{SpecError, ValidationError};
use crate::transport::FetchError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown service '{name}'; available: {available}")]
    UnknownService { name: String, available: String },

    #[error("no cache directory available for service '{0}'")]
    NoCacheDir(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
