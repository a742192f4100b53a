//! Connector manager: one live connector per configured source.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::db::{connector_for, Connector};
use crate::error::{GatewayError, Result};

/// Owns the connector for every source, keyed by source id.
#[derive(Default)]
pub struct ConnectorManager {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an unconnected connector for every configured source.
    ///
    /// Sources without a built-in driver are skipped with a warning; calls
    /// against them fail until a connector is registered.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut manager = Self::new();
        for source in &config.sources {
            match connector_for(&config.connector_source(source)) {
                Ok(connector) => manager.register(connector),
                Err(e) => warn!("{}", e),
            }
        }
        manager
    }

    /// Registers (or replaces) the connector for its source id.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors
            .insert(connector.source_id().to_string(), connector);
    }

    /// Returns the connector for a source.
    pub fn get(&self, source_id: &str) -> Result<Arc<dyn Connector>> {
        self.connectors.get(source_id).cloned().ok_or_else(|| {
            GatewayError::connection(format!("No connector registered for source '{source_id}'"))
        })
    }

    /// Source ids with a registered connector, sorted.
    pub fn source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Connects every source, stopping at the first failure.
    pub async fn connect_all(&self) -> Result<()> {
        for id in self.source_ids() {
            let connector = self.get(id)?;
            connector.ensure_connected().await?;
            info!("Source '{}' ready ({})", id, connector.engine());
        }
        Ok(())
    }

    /// Disconnects every source. Errors are logged, not returned.
    pub async fn disconnect_all(&self) {
        for (id, connector) in &self.connectors {
            if let Err(e) = connector.disconnect().await {
                warn!("Source '{}': failed to disconnect: {}", id, e);
            }
        }
    }
}
