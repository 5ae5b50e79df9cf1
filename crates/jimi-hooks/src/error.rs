//! Hook error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from hook loading and execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// Failed to read a hook directory.
    #[error("failed to read hook directory {path}: {message}")]
    DirectoryReadFailed {
        /// The directory that failed.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to parse a hook file.
    #[error("failed to parse hook file {path}: {message}")]
    ParseFailed {
        /// The file that failed.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A script could not be spawned.
    #[error("failed to spawn hook script: {0}")]
    SpawnFailed(String),

    /// A script exceeded its timeout.
    #[error("hook timed out after {0}s")]
    Timeout(u64),

    /// A script exited with a non-zero status.
    #[error("hook exited with status {status}: {stderr}")]
    NonZeroExit {
        /// Exit status code.
        status: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// A named meta-command failed.
    #[error("hook command '{command}' failed: {message}")]
    CommandFailed {
        /// The command name.
        command: String,
        /// Error message.
        message: String,
    },

    /// No runner is configured for meta-commands.
    #[error("no command runner configured for hook command '{0}'")]
    NoCommandRunner(String),
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;
