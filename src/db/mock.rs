//! Test doubles for the connector abstraction.
//!
//! `MockConnector` returns a canned result and records every statement it
//! receives, so tests can assert that rejected statements never reach a
//! database. `FailingConnector` fails every operation.

use super::{Connector, EngineType, QueryResult, Schema};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct MockState {
    calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
    connected: AtomicBool,
}

/// A connector that returns predefined results.
#[derive(Debug, Clone)]
pub struct MockConnector {
    source_id: String,
    engine: EngineType,
    result: QueryResult,
    schema: Schema,
    delay: Option<Duration>,
    error: Option<String>,
    state: Arc<MockState>,
}

impl MockConnector {
    /// Creates a mock that answers every statement with an empty result.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            engine: EngineType::Postgres,
            result: QueryResult::new(),
            schema: Schema::new(),
            delay: None,
            error: None,
            state: Arc::new(MockState::default()),
        }
    }

    /// Sets the engine the mock reports.
    pub fn with_engine(mut self, engine: EngineType) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the result returned for every statement.
    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = result;
        self
    }

    /// Sets the schema returned by introspection.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Makes every statement take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every statement fail with a query error.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Number of statements that reached the connector.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Statements received so far, in arrival order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn engine(&self) -> EngineType {
        self.engine
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn connect(&self) -> Result<()> {
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn execute_sql(&self, sql: &str, deadline: Instant) -> Result<QueryResult> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());

        let start = Instant::now();
        if let Some(delay) = self.delay {
            tokio::time::timeout_at(deadline, tokio::time::sleep(delay))
                .await
                .map_err(|_| GatewayError::Timeout(start.elapsed()))?;
        }

        match &self.error {
            Some(message) => Err(GatewayError::query(message.clone())),
            None => Ok(self.result.clone().with_execution_time(start.elapsed())),
        }
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn clone_connector(&self) -> Box<dyn Connector> {
        Box::new(self.clone())
    }
}

/// A connector whose every operation fails with a connection error.
#[derive(Debug, Clone)]
pub struct FailingConnector {
    source_id: String,
}

impl FailingConnector {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }

    fn error(&self) -> GatewayError {
        GatewayError::connection(format!("Source '{}' is unreachable", self.source_id))
    }
}

#[async_trait]
impl Connector for FailingConnector {
    fn engine(&self) -> EngineType {
        EngineType::Postgres
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn connect(&self) -> Result<()> {
        Err(self.error())
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn execute_sql(&self, _sql: &str, _deadline: Instant) -> Result<QueryResult> {
        Err(self.error())
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Err(self.error())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn clone_connector(&self) -> Box<dyn Connector> {
        Box::new(self.clone())
    }
}
