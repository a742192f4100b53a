//! Tool registry: resolves tool names to sources and policies.
//!
//! Built once at startup and passed by reference to whatever serves calls.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{GatewayConfig, ToolBindingConfig, DEFAULT_QUERY_TIMEOUT};
use crate::connection::ConnectorManager;
use crate::db::{Connector, ObjectType};
use crate::error::{ErrorCode, GatewayError, Result};
use crate::query::{ExecutionPolicy, ExecutionRequest, QueryExecutor, SearchRequest};
use crate::response::{error_response, ToolResponse};

use super::{tool_definition, ExecuteSqlInput, SearchObjectsInput, ToolDefinition, ToolKind};

/// A tool bound to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTool {
    /// Exposed tool name.
    pub name: String,
    pub kind: ToolKind,
    /// Source the tool runs against.
    pub source_id: String,
    /// Effective policy.
    pub policy: ExecutionPolicy,
}

/// Maps exposed tool names to their bindings and runs calls.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    connectors: Arc<ConnectorManager>,
    executor: QueryExecutor,
}

impl ToolRegistry {
    /// Builds the registry from configuration.
    ///
    /// With no bindings configured, every source gets an implicit
    /// `execute_sql`. Bindings of unknown tool kinds are ignored. A tool is
    /// exposed under its kind for the first source and as `<kind>_<source>`
    /// for the others.
    pub fn initialize(
        config: &GatewayConfig,
        allow_destructive: bool,
        connectors: Arc<ConnectorManager>,
        executor: QueryExecutor,
    ) -> Result<Self> {
        config.validate()?;

        let implicit: Vec<ToolBindingConfig>;
        let bindings = if config.tools.is_empty() {
            implicit = config
                .sources
                .iter()
                .map(|s| ToolBindingConfig::execute_sql(s.id.clone()))
                .collect();
            &implicit
        } else {
            &config.tools
        };

        let first_source = config.sources.first().map(|s| s.id.as_str());
        let mut names = HashSet::new();
        let mut tools = Vec::new();

        for binding in bindings {
            let Some(kind) = ToolKind::parse(&binding.name) else {
                debug!(
                    "Ignoring tool '{}' on source '{}': not served here",
                    binding.name, binding.source
                );
                continue;
            };

            let source = config.source(&binding.source).ok_or_else(|| {
                GatewayError::config(format!("Unknown source '{}'", binding.source))
            })?;

            let name = if Some(source.id.as_str()) == first_source {
                kind.as_str().to_string()
            } else {
                format!("{}_{}", kind.as_str(), source.id)
            };
            if !names.insert(name.clone()) {
                return Err(GatewayError::config(format!(
                    "Duplicate tool '{}' for source '{}'",
                    binding.name, binding.source
                )));
            }

            let policy = ExecutionPolicy {
                readonly: !allow_destructive
                    || source.readonly.unwrap_or(false)
                    || binding.readonly.unwrap_or(false),
                timeout: binding
                    .timeout
                    .or(source.timeout)
                    .map(std::time::Duration::from_secs)
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT),
                max_rows: binding.max_rows,
            };

            debug!(
                "Registered tool '{}' on source '{}' (readonly: {}, timeout: {:?}, max_rows: {:?})",
                name, source.id, policy.readonly, policy.timeout, policy.max_rows
            );
            tools.push(RegisteredTool {
                name,
                kind,
                source_id: source.id.clone(),
                policy,
            });
        }

        Ok(Self {
            tools,
            connectors,
            executor,
        })
    }

    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Looks up a tool by its exposed name.
    pub fn resolve(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(tool_definition).collect()
    }

    pub fn connectors(&self) -> &ConnectorManager {
        &self.connectors
    }

    /// Handles a raw tool call with JSON arguments.
    pub async fn call(&self, tool_name: &str, arguments: serde_json::Value) -> ToolResponse {
        let Some(tool) = self.resolve(tool_name) else {
            return unknown_tool(tool_name);
        };

        match tool.kind {
            ToolKind::ExecuteSql => match serde_json::from_value::<ExecuteSqlInput>(arguments) {
                Ok(input) => self.execute_sql(tool_name, &input.sql).await,
                Err(e) => invalid_arguments(tool_name, e),
            },
            ToolKind::SearchObjects => {
                match serde_json::from_value::<SearchObjectsInput>(arguments) {
                    Ok(input) => {
                        self.search_objects(tool_name, input.pattern.as_deref(), input.object_type)
                            .await
                    }
                    Err(e) => invalid_arguments(tool_name, e),
                }
            }
        }
    }

    /// Runs `sql` through the named tool and builds the response.
    pub async fn execute_sql(&self, tool_name: &str, sql: &str) -> ToolResponse {
        let tool = match self.resolve_kind(tool_name, ToolKind::ExecuteSql) {
            Ok(tool) => tool,
            Err(response) => return response,
        };
        let connector = match self.connected(tool).await {
            Ok(connector) => connector,
            Err(response) => return response,
        };

        let request = ExecutionRequest::new(sql, tool.policy, &tool.source_id, &tool.name);
        let outcome = self.executor.execute(&request, connector.as_ref()).await;
        outcome.to_response()
    }

    /// Searches the named tool's source for tables and columns.
    pub async fn search_objects(
        &self,
        tool_name: &str,
        pattern: Option<&str>,
        object_type: Option<ObjectType>,
    ) -> ToolResponse {
        let tool = match self.resolve_kind(tool_name, ToolKind::SearchObjects) {
            Ok(tool) => tool,
            Err(response) => return response,
        };
        let connector = match self.connected(tool).await {
            Ok(connector) => connector,
            Err(response) => return response,
        };

        let request =
            SearchRequest::new(pattern, object_type, tool.policy, &tool.source_id, &tool.name);
        let outcome = self
            .executor
            .search_objects(&request, connector.as_ref())
            .await;
        outcome.to_response()
    }

    fn resolve_kind(
        &self,
        tool_name: &str,
        kind: ToolKind,
    ) -> std::result::Result<&RegisteredTool, ToolResponse> {
        match self.resolve(tool_name) {
            Some(tool) if tool.kind == kind => Ok(tool),
            Some(tool) => Err(error_response(
                &format!("Tool '{}' is a {} tool", tool.name, tool.kind.as_str()),
                ErrorCode::ExecutionError,
            )),
            None => Err(unknown_tool(tool_name)),
        }
    }

    /// The tool's connector, connected.
    async fn connected(
        &self,
        tool: &RegisteredTool,
    ) -> std::result::Result<Arc<dyn Connector>, ToolResponse> {
        let connector = self.connectors.get(&tool.source_id).map_err(|e| {
            warn!("Tool '{}': {}", tool.name, e);
            error_response(&e.to_string(), ErrorCode::ExecutionError)
        })?;

        if let Err(e) = connector.ensure_connected().await {
            warn!("Tool '{}': {}", tool.name, e);
            return Err(error_response(&e.to_string(), ErrorCode::ExecutionError));
        }
        Ok(connector)
    }
}

fn unknown_tool(tool_name: &str) -> ToolResponse {
    error_response(&format!("Unknown tool '{tool_name}'"), ErrorCode::ExecutionError)
}

fn invalid_arguments(tool_name: &str, error: serde_json::Error) -> ToolResponse {
    error_response(
        &format!("Invalid arguments for '{tool_name}': {error}"),
        ErrorCode::ExecutionError,
    )
}
