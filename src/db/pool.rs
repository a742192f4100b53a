//! Shared plumbing for the sqlx-backed connectors.

use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{GatewayError, Result};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Holds a connector's pool once it is connected.
///
/// Pools are reference-counted handles, so callers clone them out and never
/// hold the lock across an await point.
#[derive(Debug)]
pub(crate) struct PoolSlot<P: Clone> {
    inner: RwLock<Option<P>>,
}

impl<P: Clone> PoolSlot<P> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Returns the pool, or a connection error if not connected.
    pub fn get(&self, source_id: &str) -> Result<P> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard
            .clone()
            .ok_or_else(|| GatewayError::connection(format!("Source '{source_id}' is not connected")))
    }

    pub fn set(&self, pool: P) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(pool);
    }

    pub fn take(&self) -> Option<P> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    pub fn is_set(&self) -> bool {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.is_some()
    }
}

/// Runs `connect` with exponential backoff while the error looks transient.
pub(crate) async fn connect_with_retry<T, F, Fut>(
    source_id: &str,
    mut connect: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        debug!(
            "Source '{}': connection attempt {} of {}",
            source_id, attempt, MAX_RETRY_ATTEMPTS
        );

        match connect().await {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                warn!(
                    "Source '{}': connection attempt {} failed (transient error), retrying in {:?}",
                    source_id, attempt, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Determines if an error is transient and worth retrying.
pub(crate) fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("access denied")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps a sqlx connection error to a connection error without echoing the DSN.
pub(crate) fn map_connection_error(error: sqlx::Error, source_id: &str) -> GatewayError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        GatewayError::connection(format!(
            "Cannot connect to source '{source_id}'. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") || error_str.contains("access denied") {
        GatewayError::connection(format!(
            "Authentication failed for source '{source_id}'. Check your credentials."
        ))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        GatewayError::connection(format!(
            "Connection to source '{source_id}' timed out. The server may be overloaded or unreachable."
        ))
    } else {
        GatewayError::connection(format!("Source '{source_id}': {error}"))
    }
}

/// Formats a query error, keeping the database's own message when there is one.
pub(crate) fn format_query_error(error: sqlx::Error) -> GatewayError {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => GatewayError::query(format!("{} (code {})", db_error.message(), code)),
            None => GatewayError::query(db_error.message().to_string()),
        },
        None => GatewayError::query(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_pool_slot_lifecycle() {
        let slot: PoolSlot<u32> = PoolSlot::new();
        assert!(!slot.is_set());
        assert!(matches!(slot.get("db"), Err(GatewayError::Connection(_))));

        slot.set(7);
        assert!(slot.is_set());
        assert_eq!(slot.get("db").unwrap(), 7);

        assert_eq!(slot.take(), Some(7));
        assert!(!slot.is_set());
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient_error(&sqlx::Error::RowNotFound));
        assert!(!is_transient_error(&sqlx::Error::Configuration(
            "password authentication failed for user".into()
        )));
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let attempts = AtomicU32::new(0);
        let result: std::result::Result<(), sqlx::Error> = connect_with_retry("db", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: std::result::Result<(), sqlx::Error> = connect_with_retry("db", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::PoolTimedOut) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRY_ATTEMPTS);
    }

    #[test]
    fn test_connection_error_does_not_echo_dsn() {
        let err = map_connection_error(
            sqlx::Error::Configuration("connection refused: postgres://u:secret@h/db".into()),
            "prod",
        );
        assert!(!err.to_string().contains("secret"));
        assert!(err.to_string().contains("prod"));
    }
}
