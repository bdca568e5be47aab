//! Error types for xcode-tools-mcp.
//!
//! Protocol-level failures are not errors in this sense: they are encoded as
//! JSON-RPC error envelopes by [`crate::mcp::protocol`]. The types here cover
//! configuration loading and tool execution.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised by tool and resource handlers.
///
/// The dispatcher turns every variant into a JSON-RPC internal error whose
/// message is the `Display` text below, so messages must stay readable and
/// must not leak anything beyond what the caller supplied.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Arguments were well-formed but semantically unusable.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Nothing was selected or supplied for a required value.
    #[error("{0}")]
    NotSelected(String),

    /// A referenced project, scheme or destination does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external command could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An external command exceeded its wall-clock budget.
    #[error("`{program}` timed out after {}s", timeout.as_secs())]
    Timeout {
        /// The program that timed out.
        program: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// An external command exited unsuccessfully.
    #[error("`{program}` exited with status {status}: {detail}")]
    CommandFailed {
        /// The program that failed.
        program: String,
        /// Exit status, or -1 if terminated by a signal.
        status: i32,
        /// Trimmed tail of the command's output.
        detail: String,
    },

    /// An external command produced output we could not interpret.
    #[error("unexpected output from `{program}`: {message}")]
    UnexpectedOutput {
        /// The program whose output was rejected.
        program: String,
        /// What was wrong with it.
        message: String,
    },

    /// The persisted selection state could not be read or written.
    #[error("selection state error at {path}: {message}")]
    State {
        /// Path of the state file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tool handlers.
pub type ToolResult<T> = std::result::Result<T, ToolError>;
