//! Error types for the gateway.
//!
//! `GatewayError` keeps the detailed internal taxonomy used for logs and
//! control flow. `ErrorCode` is the deliberately two-valued taxonomy exposed
//! to tool callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Database connection errors (host unreachable, auth failed, missing driver).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors reported by the engine (syntax, missing table, ...).
    #[error("Query error: {0}")]
    Query(String),

    /// The statement did not finish before its deadline.
    #[error("Query timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// Failures writing a result to the staging area.
    #[error("Staging error: {0}")]
    Staging(String),

    /// Configuration errors (invalid config file, unknown source, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, serialization failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a staging error with the given message.
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for log output.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Timeout(_) => "Timeout",
            Self::Staging(_) => "Staging Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Staging(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization failed: {err}"))
    }
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error code surfaced to tool callers.
///
/// Everything that is not a policy rejection collapses into
/// `ExecutionError`: syntax errors, missing tables, timeouts and
/// connector failures are indistinguishable at this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ReadonlyViolation,
    ExecutionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadonlyViolation => "READONLY_VIOLATION",
            Self::ExecutionError => "EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
