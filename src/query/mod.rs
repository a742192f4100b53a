//! Statement execution under a policy.
//!
//! A request carries the SQL text and the policy resolved for its tool; the
//! executor classifies, dispatches, stages and reports an outcome.

pub mod executor;

pub use executor::QueryExecutor;

use crate::config::DEFAULT_QUERY_TIMEOUT;
use crate::db::ObjectType;
use crate::error::{ErrorCode, GatewayError};
use crate::response::{error_response, pii_safe_success, ToolResponse};
use crate::staging::StagedResult;
use std::time::Duration;

/// Effective limits for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Reject destructive statements before they reach the connector.
    pub readonly: bool,
    /// How long to wait for the connector.
    pub timeout: Duration,
    /// Rows kept from a result; `None` keeps all.
    pub max_rows: Option<usize>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            readonly: true,
            timeout: DEFAULT_QUERY_TIMEOUT,
            max_rows: None,
        }
    }
}

/// A single `execute_sql` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub sql: String,
    pub policy: ExecutionPolicy,
    pub source_id: String,
    pub tool_name: String,
}

impl ExecutionRequest {
    pub fn new(
        sql: impl Into<String>,
        policy: ExecutionPolicy,
        source_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            sql: sql.into(),
            policy,
            source_id: source_id.into(),
            tool_name: tool_name.into(),
        }
    }
}

/// A single `search_objects` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Case-insensitive substring; `None` matches everything.
    pub pattern: Option<String>,
    /// Restricts matches to tables or columns.
    pub object_type: Option<ObjectType>,
    pub policy: ExecutionPolicy,
    pub source_id: String,
    pub tool_name: String,
}

impl SearchRequest {
    pub fn new(
        pattern: Option<&str>,
        object_type: Option<ObjectType>,
        policy: ExecutionPolicy,
        source_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.map(str::to_string),
            object_type,
            policy,
            source_id: source_id.into(),
            tool_name: tool_name.into(),
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Rows were staged.
    Success {
        staged: StagedResult,
        row_count: usize,
        truncated: bool,
        columns: usize,
    },
    /// A destructive statement was rejected; the connector was never called.
    ReadonlyViolation { fragment: String },
    /// The connector or the staging area failed.
    ExecutionError { message: String, code: ErrorCode },
    /// The deadline passed before the connector answered.
    Timeout { after: Duration },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Caller-facing error code, if the request failed.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::ReadonlyViolation { .. } => Some(ErrorCode::ReadonlyViolation),
            Self::ExecutionError { code, .. } => Some(*code),
            Self::Timeout { .. } => Some(ErrorCode::ExecutionError),
        }
    }

    /// Full error message, before truncation.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::ReadonlyViolation { fragment } => Some(format!(
                "Read-only mode is enabled: {fragment} is not allowed. \
                 Only SELECT, WITH, SHOW, DESCRIBE, EXPLAIN and PRAGMA reads can run."
            )),
            Self::ExecutionError { message, .. } => Some(message.clone()),
            Self::Timeout { after } => Some(GatewayError::Timeout(*after).to_string()),
        }
    }

    /// Builds the PII-safe tool response for this outcome.
    pub fn to_response(&self) -> ToolResponse {
        match (self.code(), self.message()) {
            (Some(code), Some(message)) => error_response(&message, code),
            _ => pii_safe_success(),
        }
    }
}
