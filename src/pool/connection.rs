use std::fmt;
use std::time::{Duration, Instant};

use crate::driver::{Command, NativeConnection, QueryOutcome};
use crate::error::RecordMiddlewareError;

/// A pooled native connection.
///
/// Owned exclusively by the pool while idle and by exactly one borrower
/// otherwise; returning it to the pool invalidates the borrower's handle by
/// moving it back.
pub struct PooledConnection {
    inner: Box<dyn NativeConnection>,
    database: String,
    last_used: Instant,
    generation: u64,
}

impl PooledConnection {
    pub(crate) fn new(inner: Box<dyn NativeConnection>, database: &str, generation: u64) -> Self {
        Self {
            inner,
            database: database.to_string(),
            last_used: Instant::now(),
            generation,
        }
    }

    /// Logical database name this connection is bound to.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Whether the native handle is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// How long this connection has sat since it was last borrowed or
    /// returned.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) async fn change_database(
        &mut self,
        database: &str,
    ) -> Result<(), RecordMiddlewareError> {
        self.inner.change_database(database).await?;
        self.database = database.to_string();
        Ok(())
    }

    /// Run a DML/DDL statement on the native handle.
    ///
    /// # Errors
    ///
    /// Propagates the driver's failure unchanged.
    pub async fn execute(&mut self, command: &Command) -> Result<usize, RecordMiddlewareError> {
        self.inner.execute(command).await
    }

    /// Run a reader on the native handle.
    ///
    /// # Errors
    ///
    /// Propagates the driver's failure unchanged.
    pub async fn query(
        &mut self,
        command: &Command,
    ) -> Result<QueryOutcome, RecordMiddlewareError> {
        self.inner.query(command).await
    }

    pub(crate) async fn close(&mut self) {
        self.inner.close().await;
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("database", &self.database)
            .field("open", &self.inner.is_open())
            .field("generation", &self.generation)
            .finish()
    }
}
