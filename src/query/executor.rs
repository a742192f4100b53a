//! Query execution with safety classification.
//!
//! Classification always happens before dispatch. A destructive statement
//! under a read-only policy ends here without touching the connector.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EXECUTE_SQL_TOOL, SEARCH_OBJECTS_TOOL};
use crate::db::{Connector, QueryResult};
use crate::error::{ErrorCode, GatewayError};
use crate::safety::SqlClassifier;
use crate::staging::ResultStager;

use super::{ExecutionOutcome, ExecutionPolicy, ExecutionRequest, SearchRequest};

/// Runs requests against connectors and stages their results.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    stager: Arc<ResultStager>,
}

impl QueryExecutor {
    /// Creates an executor that stages results with `stager`.
    pub fn new(stager: Arc<ResultStager>) -> Self {
        Self { stager }
    }

    pub fn stager(&self) -> &ResultStager {
        &self.stager
    }

    /// Classifies, dispatches and stages one request.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        connector: &dyn Connector,
    ) -> ExecutionOutcome {
        let classifier = SqlClassifier::with_dialect(connector.engine().dialect());
        let classification = classifier.classify(&request.sql);
        debug!(
            "Tool '{}': classified as {} ({})",
            request.tool_name, classification.verdict, classification.statement_type
        );

        if request.policy.readonly && classification.is_destructive() {
            let fragment = classification.fragment();
            warn!(
                "Tool '{}': rejected destructive statement under read-only policy: {}",
                request.tool_name, fragment
            );
            return ExecutionOutcome::ReadonlyViolation { fragment };
        }

        let timeout = request.policy.timeout;
        let deadline = Instant::now() + timeout;
        info!(
            "Tool '{}': dispatching to source '{}' (timeout {:?})",
            request.tool_name, request.source_id, timeout
        );

        let result =
            match tokio::time::timeout_at(deadline, connector.execute_sql(&request.sql, deadline))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(timeout)),
            };

        match result {
            Ok(result) => {
                self.stage_result(
                    EXECUTE_SQL_TOOL,
                    &request.tool_name,
                    &request.source_id,
                    &request.policy,
                    result,
                )
                .await
            }
            Err(e) => failed(&request.tool_name, &request.source_id, &request.policy, e),
        }
    }

    /// Searches the source's tables and columns and stages the matches.
    ///
    /// Introspection only reads catalog tables, so no classification is
    /// involved; the deadline and row cap still apply.
    pub async fn search_objects(
        &self,
        request: &SearchRequest,
        connector: &dyn Connector,
    ) -> ExecutionOutcome {
        let timeout = request.policy.timeout;
        let start = Instant::now();
        info!(
            "Tool '{}': searching objects on source '{}' (timeout {:?})",
            request.tool_name, request.source_id, timeout
        );

        let schema = match tokio::time::timeout(timeout, connector.introspect_schema()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        };

        match schema {
            Ok(schema) => {
                let result = schema
                    .search(request.pattern.as_deref(), request.object_type)
                    .with_execution_time(start.elapsed());
                self.stage_result(
                    SEARCH_OBJECTS_TOOL,
                    &request.tool_name,
                    &request.source_id,
                    &request.policy,
                    result,
                )
                .await
            }
            Err(e) => failed(&request.tool_name, &request.source_id, &request.policy, e),
        }
    }

    /// Applies the row cap and writes the result to the staging area.
    async fn stage_result(
        &self,
        kind: &str,
        tool_name: &str,
        source_id: &str,
        policy: &ExecutionPolicy,
        mut result: QueryResult,
    ) -> ExecutionOutcome {
        let truncated = match policy.max_rows {
            Some(max_rows) => result.cap_rows(max_rows),
            None => false,
        };
        if truncated {
            warn!(
                "Tool '{}': result truncated to {} of {} rows",
                tool_name,
                result.row_count,
                result.total_rows.unwrap_or(result.row_count)
            );
        }

        match self
            .stager
            .stage_for(kind, source_id, &result.columns, &result.rows)
            .await
        {
            Ok(staged) => {
                info!(
                    "Tool '{}': {} rows in {:?}",
                    tool_name, result.row_count, result.execution_time
                );
                ExecutionOutcome::Success {
                    staged,
                    row_count: result.row_count,
                    truncated,
                    columns: result.columns.len(),
                }
            }
            Err(e) => {
                warn!("Tool '{}': {}: {}", tool_name, e.category(), e);
                ExecutionOutcome::ExecutionError {
                    message: e.to_string(),
                    code: ErrorCode::ExecutionError,
                }
            }
        }
    }
}

/// Maps a connector failure to an outcome. Timeouts report the policy's
/// timeout, not the time the connector happened to observe.
fn failed(
    tool_name: &str,
    source_id: &str,
    policy: &ExecutionPolicy,
    error: GatewayError,
) -> ExecutionOutcome {
    match error {
        GatewayError::Timeout(_) => {
            warn!(
                "Tool '{}': source '{}' timed out after {:?}",
                tool_name, source_id, policy.timeout
            );
            ExecutionOutcome::Timeout {
                after: policy.timeout,
            }
        }
        e => {
            warn!(
                "Tool '{}': {} on source '{}': {}",
                tool_name,
                e.category(),
                source_id,
                e
            );
            ExecutionOutcome::ExecutionError {
                message: e.to_string(),
                code: ErrorCode::ExecutionError,
            }
        }
    }
}
