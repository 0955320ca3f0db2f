//! Error types for garble

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GarbleError>;

#[derive(Error, Debug)]
pub enum GarbleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("typecheck error: {0}")]
    TypeCheck(String),

    #[error("Toolchain error: {0}")]
    Toolchain(String),

    #[error("could not find imported package {0:?}")]
    MissingImport(String),

    #[error("could not find {0} argument")]
    MissingBuildFlag(&'static str),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl GarbleError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        GarbleError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
