use std::path::PathBuf;
use thiserror::Error;

/// Errors that make a process unable to start. All of them are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from file: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),

    #[error("Credential file not found: {0}")]
    CredentialFileMissing(PathBuf),

    #[error("Failed to read credential file {path}: {source}")]
    CredentialFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file {path} has no line {index}")]
    CredentialLineMissing { index: usize, path: PathBuf },

    #[error("Credential on line {0} is empty")]
    EmptyCredential(usize),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
