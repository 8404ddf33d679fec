//! Testing utilities: a simulated database resource.
//!
//! [`MockDatabase`] opens [`MockConnection`]s without any I/O. Tests can make
//! the factory fail, slow it down, or kill individual connections so that
//! hand-out validation rejects them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::error::{Error, Result};
use crate::resource::{Config, Resource};

/// Creation parameters for [`MockDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDatabaseConfig {
    /// Connection string handed to every connection.
    pub connection_string: String,
}

impl MockDatabaseConfig {
    /// Config for the given connection string.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

impl Config for MockDatabaseConfig {
    fn validate(&self) -> Result<()> {
        if self.connection_string.is_empty() {
            return Err(Error::configuration("connection_string cannot be empty"));
        }
        Ok(())
    }
}

/// Errors produced by the simulated database.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockError {
    /// The factory was told to fail.
    #[error("connection refused by {0}")]
    Refused(String),
    /// A query ran on a killed connection.
    #[error("connection {0} is closed")]
    Closed(u64),
}

/// One simulated connection.
#[derive(Debug)]
pub struct MockConnection {
    serial: u64,
    connection_string: String,
    alive: Arc<AtomicBool>,
    executed: Vec<String>,
}

impl MockConnection {
    /// Creation order of this connection, starting at 1.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The connection string it was opened with.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Whether the simulated server still considers this connection open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Simulate the server dropping this connection.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Run a query, recording it. Fails once the connection was killed.
    pub fn execute(&mut self, query: &str) -> std::result::Result<usize, MockError> {
        if !self.is_alive() {
            return Err(MockError::Closed(self.serial));
        }
        tracing::trace!(serial = self.serial, query, "Executing query");
        self.executed.push(query.to_string());
        Ok(self.executed.len())
    }

    /// Queries run so far on this connection.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    closed: AtomicU64,
    fail_next: AtomicUsize,
    create_delay_ms: AtomicU64,
}

/// Simulated database; cloning shares the counters and knobs.
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    counters: Arc<Counters>,
}

impl MockDatabase {
    /// A database that accepts every connection immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each connection take `delay` to open.
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.counters
            .create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: usize) {
        self.counters.fail_next.store(count, Ordering::SeqCst);
    }

    /// Connections opened so far.
    pub fn opened_connections(&self) -> u64 {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Connections cleaned up so far.
    pub fn closed_connections(&self) -> u64 {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet cleaned up.
    pub fn open_connections(&self) -> u64 {
        self.opened_connections() - self.closed_connections()
    }
}

impl Resource for MockDatabase {
    type Config = MockDatabaseConfig;
    type Instance = MockConnection;
    type Error = MockError;

    fn id(&self) -> &str {
        "mock-db"
    }

    async fn create(
        &self,
        config: &MockDatabaseConfig,
    ) -> std::result::Result<MockConnection, MockError> {
        let delay = self.counters.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let refused = self
            .counters
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(MockError::Refused(config.connection_string.clone()));
        }

        let serial = self.counters.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            serial,
            connection_string: config.connection_string.clone(),
            alive: Arc::new(AtomicBool::new(true)),
            executed: Vec::new(),
        })
    }

    async fn is_valid(&self, connection: &MockConnection) -> std::result::Result<bool, MockError> {
        Ok(connection.is_alive())
    }

    async fn cleanup(&self, connection: MockConnection) -> std::result::Result<(), MockError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        drop(connection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factory_failures_are_counted_down() {
        let db = MockDatabase::new();
        let config = MockDatabaseConfig::new("postgres://db");
        db.fail_next(1);

        let err = db.create(&config).await.unwrap_err();
        assert_eq!(err, MockError::Refused("postgres://db".to_string()));

        let conn = db.create(&config).await.unwrap();
        assert_eq!(conn.serial(), 1);
        assert_eq!(db.opened_connections(), 1);
    }

    #[tokio::test]
    async fn killed_connection_fails_queries_and_validation() {
        let db = MockDatabase::new();
        let mut conn = db
            .create(&MockDatabaseConfig::new("postgres://db"))
            .await
            .unwrap();
        assert_eq!(conn.execute("SELECT 1").unwrap(), 1);

        conn.kill();
        assert_eq!(conn.execute("SELECT 2"), Err(MockError::Closed(1)));
        assert!(!db.is_valid(&conn).await.unwrap());
        assert_eq!(conn.executed(), ["SELECT 1".to_string()]);
    }
}
