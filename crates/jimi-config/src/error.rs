//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from configuration loading; fatal at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file or directory could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A YAML document could not be parsed.
    #[error("malformed YAML in {path}: {message}")]
    Yaml {
        /// The file that failed.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A required field is missing or empty.
    #[error("{path}: missing required field '{field}'")]
    MissingField {
        /// The file with the problem.
        path: PathBuf,
        /// The missing field.
        field: &'static str,
    },

    /// An agent references an unknown sub-agent.
    #[error("agent '{agent}' references unknown sub-agent '{subagent}'")]
    UnknownSubAgent {
        /// The referencing agent.
        agent: String,
        /// The unknown reference.
        subagent: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
