//! Configuration management for the gateway.
//!
//! Handles loading sources and tool bindings from a TOML file, or building a
//! single-source configuration from a DSN.

use crate::db::EngineType;
use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Timeout applied when neither the tool nor the source sets one.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Source id used in single-DSN mode.
pub const DEFAULT_SOURCE_ID: &str = "default";

/// Tool kind that runs SQL against a source.
pub const EXECUTE_SQL_TOOL: &str = "execute_sql";

/// Tool kind that searches a source's tables and columns.
pub const SEARCH_OBJECTS_TOOL: &str = "search_objects";

/// Top-level configuration: sources and the tools bound to them.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayConfig {
    /// Configured database sources, in declaration order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Tool bindings. Empty means every source gets an implicit `execute_sql`.
    #[serde(default)]
    pub tools: Vec<ToolBindingConfig>,
}

/// A configured database source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Unique source identifier.
    pub id: String,

    /// Database engine.
    #[serde(rename = "type")]
    pub engine: EngineType,

    /// Connection string.
    pub dsn: String,

    /// Forces every tool on this source to be read-only.
    #[serde(default)]
    pub readonly: Option<bool>,

    /// Statement timeout in seconds.
    #[serde(default, alias = "query_timeout")]
    pub timeout: Option<u64>,
}

impl SourceConfig {
    /// Creates a source with no readonly flag and no timeout.
    pub fn new(id: impl Into<String>, engine: EngineType, dsn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            engine,
            dsn: dsn.into(),
            readonly: None,
            timeout: None,
        }
    }

    /// The source's own timeout, or the default.
    ///
    /// The connector installs this server-side; see
    /// [`GatewayConfig::connector_source`] for the value raised to cover
    /// longer tool timeouts.
    pub fn statement_timeout(&self) -> Duration {
        self.timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_QUERY_TIMEOUT)
    }

    /// Returns a display-safe string (no credentials) for log output.
    pub fn display_string(&self) -> String {
        format!("{} ({} @ {})", self.id, self.engine, redact_dsn(&self.dsn))
    }
}

/// Binds a tool to a source, with optional policy overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolBindingConfig {
    /// Tool kind: `execute_sql` or `search_objects`. Other kinds are ignored.
    pub name: String,

    /// Id of the source the tool runs against.
    pub source: String,

    /// Forces this tool to be read-only.
    #[serde(default)]
    pub readonly: Option<bool>,

    /// Maximum rows kept from a result.
    #[serde(default)]
    pub max_rows: Option<usize>,

    /// Per-tool timeout in seconds; overrides the source timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ToolBindingConfig {
    /// Creates an `execute_sql` binding with no overrides.
    pub fn execute_sql(source: impl Into<String>) -> Self {
        Self {
            name: EXECUTE_SQL_TOOL.to_string(),
            source: source.into(),
            readonly: None,
            max_rows: None,
            timeout: None,
        }
    }

    /// Creates a `search_objects` binding with no overrides.
    pub fn search_objects(source: impl Into<String>) -> Self {
        Self {
            name: SEARCH_OBJECTS_TOOL.to_string(),
            ..Self::execute_sql(source)
        }
    }
}

impl GatewayConfig {
    /// Builds a single-source configuration from a DSN.
    ///
    /// The engine is inferred from the URL scheme.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let engine = engine_from_dsn(dsn)?;
        Ok(Self {
            sources: vec![SourceConfig::new(DEFAULT_SOURCE_ID, engine, dsn)],
            tools: Vec::new(),
        })
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            GatewayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Checks cross-references and value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(GatewayError::config("No sources configured"));
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(GatewayError::config("Source id must not be empty"));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(GatewayError::config(format!(
                    "Duplicate source id '{}'",
                    source.id
                )));
            }
            if source.dsn.trim().is_empty() {
                return Err(GatewayError::config(format!(
                    "Source '{}' has an empty dsn",
                    source.id
                )));
            }
            if source.timeout == Some(0) {
                return Err(GatewayError::config(format!(
                    "Source '{}': timeout must be greater than zero",
                    source.id
                )));
            }
        }

        for tool in &self.tools {
            if !ids.contains(tool.source.as_str()) {
                return Err(GatewayError::config(format!(
                    "Tool '{}' references unknown source '{}'",
                    tool.name, tool.source
                )));
            }
            if tool.max_rows == Some(0) {
                return Err(GatewayError::config(format!(
                    "Tool '{}' on source '{}': max_rows must be greater than zero",
                    tool.name, tool.source
                )));
            }
            if tool.timeout == Some(0) {
                return Err(GatewayError::config(format!(
                    "Tool '{}' on source '{}': timeout must be greater than zero",
                    tool.name, tool.source
                )));
            }
        }

        Ok(())
    }

    /// Looks up a source by id.
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// The source as its connector should see it.
    ///
    /// The server-side statement timeout must not cut a tool short, so the
    /// source timeout is raised to the longest timeout of any tool bound to
    /// the source. Shorter tool timeouts are enforced by the caller.
    pub fn connector_source(&self, source: &SourceConfig) -> SourceConfig {
        let longest_tool = self
            .tools
            .iter()
            .filter(|tool| tool.source == source.id)
            .filter_map(|tool| tool.timeout)
            .max();

        let base = source.statement_timeout().as_secs();
        let mut effective = source.clone();
        effective.timeout = Some(longest_tool.map_or(base, |tool| tool.max(base)));
        effective
    }
}

/// Infers the engine from a DSN's scheme.
pub fn engine_from_dsn(dsn: &str) -> Result<EngineType> {
    let scheme = dsn
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| GatewayError::config("Invalid DSN: missing scheme"))?;

    EngineType::parse(scheme).ok_or_else(|| {
        GatewayError::config(format!(
            "Invalid scheme '{scheme}'. Expected postgres, mysql, mariadb, sqlserver or sqlite"
        ))
    })
}

/// Strips the password from a DSN for display.
pub fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_err() {
                return format!("{}://****", url.scheme());
            }
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => dsn.to_string(),
    }
}
