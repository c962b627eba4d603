use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("I/O error on event log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed event line: {0}")]
    Malformed(String),
}
