//! Tool definitions exposed to the calling agent.

pub mod registry;

pub use registry::{RegisteredTool, ToolRegistry};

use serde::{Deserialize, Serialize};

use crate::config::{EXECUTE_SQL_TOOL, SEARCH_OBJECTS_TOOL};
use crate::db::ObjectType;

/// Tool kinds the registry serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ExecuteSql,
    SearchObjects,
}

impl ToolKind {
    /// Parses a configured tool name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            EXECUTE_SQL_TOOL => Some(Self::ExecuteSql),
            SEARCH_OBJECTS_TOOL => Some(Self::SearchObjects),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecuteSql => EXECUTE_SQL_TOOL,
            Self::SearchObjects => SEARCH_OBJECTS_TOOL,
        }
    }
}

/// Tool definition for function calling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Arguments of an `execute_sql` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteSqlInput {
    pub sql: String,
}

/// Arguments of a `search_objects` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchObjectsInput {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub object_type: Option<ObjectType>,
}

/// Builds the definition of a registered tool.
pub fn tool_definition(tool: &RegisteredTool) -> ToolDefinition {
    match tool.kind {
        ToolKind::ExecuteSql => execute_sql_definition(tool),
        ToolKind::SearchObjects => search_objects_definition(tool),
    }
}

/// Builds the definition of a `search_objects` tool bound to one source.
pub fn search_objects_definition(tool: &RegisteredTool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name.clone(),
        description: format!(
            "Search tables and columns of source '{}' by name. Matches are written to the \
             server's result staging area; the response only reports success or an error.",
            tool.source_id
        ),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Case-insensitive substring of the object name; omit to list everything"
                },
                "object_type": {
                    "type": "string",
                    "enum": ["table", "column"],
                    "description": "Restrict matches to tables or columns"
                }
            }
        }),
    }
}

/// Builds the definition of an `execute_sql` tool bound to one source.
pub fn execute_sql_definition(tool: &RegisteredTool) -> ToolDefinition {
    let mode = if tool.policy.readonly {
        "Only read-only statements (SELECT, WITH, SHOW, DESCRIBE, EXPLAIN) are allowed."
    } else {
        "Destructive statements are allowed."
    };

    ToolDefinition {
        name: tool.name.clone(),
        description: format!(
            "Execute SQL on source '{}'. {mode} Results are written to the server's \
             result staging area; the response only reports success or an error.",
            tool.source_id
        ),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "sql": {
                    "type": "string",
                    "description": "SQL statement to execute"
                }
            },
            "required": ["sql"]
        }),
    }
}
