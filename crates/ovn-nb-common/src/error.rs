//! Error types for northbound operations.

use std::io;
use thiserror::Error;

/// Result type alias for northbound operations.
pub type NbResult<T> = Result<T, NbError>;

/// Errors that can occur while talking to the northbound database.
#[derive(Debug, Error)]
pub enum NbError {
    /// Failed to spawn the backend command.
    #[error("Failed to execute command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Backend command returned a non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Diagnostic output (stderr, or stdout when stderr was empty).
        output: String,
    },

    /// Backend returned output that could not be interpreted.
    #[error("Unexpected output from {operation}: {output:?}")]
    Parse {
        /// The operation whose output was malformed.
        operation: String,
        /// The offending output.
        output: String,
    },

    /// Failure injected by a test backend.
    #[error("Injected failure in {operation}")]
    Injected {
        /// The operation that was configured to fail.
        operation: String,
    },
}

impl NbError {
    /// Creates a parse error.
    pub fn parse(operation: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Parse {
            operation: operation.into(),
            output: output.into(),
        }
    }

    /// Creates an injected failure.
    pub fn injected(operation: impl Into<String>) -> Self {
        Self::Injected {
            operation: operation.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on a later event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NbError::CommandFailed { .. } | NbError::ShellExec { .. })
    }
}
