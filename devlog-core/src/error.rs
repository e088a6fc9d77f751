//! Error types for the core crate.
//!
//! Generation failures are not errors here: they are tagged outcomes handled
//! inside [`crate::generation`]. Only state persistence, configuration, and
//! run-aborting conditions surface as `Err`.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reading or writing persisted run state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid pipeline settings. Raised before any event is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open run state: {0}")]
    State(#[source] StateError),
}
