//! Error type shared by every stage of a mapping run.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("input file {path} must have at least 2 columns, found {found}")]
    InputFormat { path: PathBuf, found: usize },

    #[error("failed to read input file {path}: {message}")]
    InputRead { path: PathBuf, message: String },

    #[error("invalid dataset configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("warehouse connection failed: {0}")]
    Connection(#[source] WarehouseError),

    #[error("failed to write output to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, MapperError>;
