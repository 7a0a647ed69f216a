//! Error types for the Drover runtime

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Drover operations
pub type DroverResult<T> = Result<T, DroverError>;

/// Main error type for the Drover runtime
#[derive(Error, Debug, Clone)]
pub enum DroverError {
    /// Configuration related errors (startup only)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by the automation driver
    #[error("Driver error: {0}")]
    Driver(String),

    /// The session has no attached driver
    #[error("Session not connected: {0}")]
    NotConnected(String),

    /// A cached reference handle did not resolve
    #[error("Reference not found: {0}")]
    ReferenceNotFound(String),

    /// No handler registered for the requested tool
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Invalid arguments supplied to a tool
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// An operation exceeded its deadline
    #[error("{label} timed out after {duration:?}")]
    Timeout { label: String, duration: Duration },

    /// Session teardown finished with one or more failed steps
    #[error(transparent)]
    Teardown(#[from] TeardownFailure),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl DroverError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Create a "not connected" error naming the rejected operation
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected(format!(
            "'{}' requires a driver; call session_connect or session_launch first",
            operation.into()
        ))
    }

    /// Create a new invalid arguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Create a new timeout error
    pub fn timeout(label: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            label: label.into(),
            duration,
        }
    }
}

impl From<std::io::Error> for DroverError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for DroverError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

/// The fixed teardown steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    /// Finalize and persist the session report
    Report,
    /// Flush the session's artifact/log sink
    LogFlush,
    /// Disconnect the driver handle
    Disconnect,
    /// Terminate the launched application process
    Terminate,
    /// Clear the reference cache
    ClearRefs,
}

impl std::fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Report => "report",
            Self::LogFlush => "log-flush",
            Self::Disconnect => "disconnect",
            Self::Terminate => "terminate",
            Self::ClearRefs => "clear-refs",
        };
        f.write_str(name)
    }
}

/// A single failed teardown step
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// Which step failed
    pub step: TeardownStep,
    /// The underlying error message
    pub message: String,
}

/// Aggregate of all teardown step failures, in step order.
///
/// Every step runs regardless of earlier failures; this collects whatever
/// went wrong along the way.
#[derive(Error, Debug, Clone)]
#[error("teardown finished with {} failed step(s): {}", .steps.len(), format_steps(.steps))]
pub struct TeardownFailure {
    /// The failed steps, in the order they ran
    pub steps: Vec<StepFailure>,
}

fn format_steps(steps: &[StepFailure]) -> String {
    steps
        .iter()
        .map(|failure| format!("{}: {}", failure.step, failure.message))
        .collect::<Vec<_>>()
        .join("; ")
}
