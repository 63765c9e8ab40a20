// error.rs - Crate error types

use std::path::PathBuf;

use crate::core::ptable::PTableLoadError;

/// Errors that can occur while generating tables or scanning for recombinants.
#[derive(Debug, thiserror::Error)]
pub enum RecError {
    #[error("I/O error: {source} ({})", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid sequence data: {0}")]
    Sequence(String),

    #[error("invalid alignment: {0}")]
    Alignment(String),

    #[error("cannot load p-value table '{}': {source}", .path.display())]
    PTable {
        source: PTableLoadError,
        path: PathBuf,
    },

    #[error("unable to allocate memory for the {0}")]
    Allocation(&'static str),

    #[error("output error: {0}")]
    Output(String),
}

impl RecError {
    /// Wrap an `io::Error` with the path it happened on.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

impl From<csv::Error> for RecError {
    fn from(err: csv::Error) -> Self {
        Self::Output(err.to_string())
    }
}
