//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

use super::validator::{format_validation_errors, ConfigValidationError};
use crate::provisioning::ProvisionError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported configuration format for {path} (expected .yaml, .yml, .toml or .json)")]
    UnsupportedFormat { path: PathBuf },

    #[error("malformed {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{} invalid setting(s):\n{}", .0.len(), format_validation_errors(.0))]
    Invalid(Vec<ConfigValidationError>),

    #[error("section '{0}' is required for this command")]
    MissingSection(&'static str),
}

impl From<Vec<ConfigValidationError>> for ConfigError {
    fn from(errors: Vec<ConfigValidationError>) -> Self {
        Self::Invalid(errors)
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(err: ConfigError) -> Self {
        ProvisionError::config(err.to_string())
    }
}
