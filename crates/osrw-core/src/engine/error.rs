use super::config::ConfigError;
use super::walkers::CommError;
use crate::core::io::RestartError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Restart file '{path}' could not be used: {source}", path = path.display())]
    Restart {
        path: PathBuf,
        #[source]
        source: RestartError,
    },

    #[error("Walker communication failed: {0}")]
    Comm(#[from] CommError),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Coordinate vector has {found} entries but the potential has {expected} variables")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
