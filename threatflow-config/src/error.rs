use std::path::PathBuf;

use thiserror::Error;

/// Reasons configuration could not be resolved.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// A required key is unset or blank.
    #[error("missing required setting {key}")]
    Missing { key: &'static str },
    /// A key is set to a value that cannot be used.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    /// The `.env` file could not be read or parsed.
    #[error("failed to read env file {path}")]
    EnvFile {
        /// File that failed.
        path: PathBuf,
        /// Parser or I/O error.
        #[source]
        source: dotenvy::Error,
    },
}
