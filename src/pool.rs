//! Bounded reuse of expensive native connection handles.
//!
//! All pool state lives behind one `tokio::sync::Mutex`, held for the full
//! borrow, including the I/O of opening a brand-new connection. That
//! serializes cold opens behind the lock: correctness over throughput.

mod connection;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::driver::NativeDriver;
use crate::error::RecordMiddlewareError;

pub use connection::PooledConnection;

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections older than this are closed on the next scan.
    pub close_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Default)]
struct PoolState {
    /// Idle connections, least-recently-used first.
    idle: VecDeque<PooledConnection>,
    in_use: usize,
    generation: u64,
    closed: bool,
}

/// Connection pool keyed by logical database name.
pub struct ConnectionPool {
    driver: Arc<dyn NativeDriver>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(driver: Arc<dyn NativeDriver>, config: PoolConfig) -> Self {
        Self {
            driver,
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// The driver strategy this pool opens connections with.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn NativeDriver> {
        &self.driver
    }

    /// Borrow a connection for `database`.
    ///
    /// Scans the idle set front to back; as a housekeeping side effect any
    /// idle connection whose native handle is closed, or whose idle time
    /// exceeds the close timeout, is discarded immediately. If the driver
    /// cannot change database context, only connections already bound to
    /// `database` are eligible; otherwise the first live idle connection is
    /// accepted and re-pointed. A pool miss opens a new native connection
    /// while still holding the pool lock.
    ///
    /// The returned connection is never one known to be closed.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle fault after [`ConnectionPool::close`], and
    /// propagates driver failures from opening a new connection.
    pub async fn get_connection(
        &self,
        database: &str,
    ) -> Result<PooledConnection, RecordMiddlewareError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(RecordMiddlewareError::LifecycleError(
                "connection pool is closed".to_string(),
            ));
        }

        let mut kept = VecDeque::with_capacity(state.idle.len());
        let mut found: Option<PooledConnection> = None;
        while let Some(mut candidate) = state.idle.pop_front() {
            if !candidate.is_open() || candidate.idle_for() > self.config.close_timeout {
                tracing::debug!(
                    database = candidate.database(),
                    "discarding stale idle connection"
                );
                candidate.close().await;
                continue;
            }
            if found.is_none() {
                if candidate.database() == database {
                    found = Some(candidate);
                    continue;
                }
                if self.driver.can_change_database() {
                    match candidate.change_database(database).await {
                        Ok(()) => {
                            found = Some(candidate);
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(
                                database,
                                error = %e,
                                "failed to re-point idle connection; discarding"
                            );
                            candidate.close().await;
                            continue;
                        }
                    }
                }
            }
            kept.push_back(candidate);
        }
        state.idle = kept;

        let connection = match found {
            Some(mut connection) => {
                connection.touch();
                connection
            }
            None => {
                // Opened under the pool lock; see module docs.
                let inner = self.driver.open(database).await?;
                tracing::debug!(database, "opened new native connection");
                PooledConnection::new(inner, database, state.generation)
            }
        };
        state.in_use += 1;
        Ok(connection)
    }

    /// Return a borrowed connection.
    ///
    /// With `force_close` false and the native handle still open, the
    /// connection moves to the most-recently-used end of the idle queue;
    /// otherwise it is closed and discarded. A connection lent before the
    /// last [`ConnectionPool::clear`] is always closed.
    pub async fn return_connection(&self, mut connection: PooledConnection, force_close: bool) {
        let mut state = self.state.lock().await;
        state.in_use = state.in_use.saturating_sub(1);
        let stale = connection.generation() != state.generation || state.closed;
        if force_close || stale || !connection.is_open() {
            connection.close().await;
            return;
        }
        connection.touch();
        state.idle.push_back(connection);
    }

    /// Force-close every pooled connection.
    ///
    /// Idle connections close immediately. In-use connections are exclusively
    /// owned by their borrowers, so they are stamped stale instead and close
    /// when returned; none of them is ever reused.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        while let Some(mut connection) = state.idle.pop_front() {
            connection.close().await;
        }
    }

    /// Shut the pool down: clears all connections and fails every
    /// subsequent borrow with a lifecycle fault.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.generation += 1;
        while let Some(mut connection) = state.idle.pop_front() {
            connection.close().await;
        }
    }

    /// Number of idle connections currently held.
    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    /// Number of connections currently lent out.
    pub async fn in_use_count(&self) -> usize {
        self.state.lock().await.in_use
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("close_timeout", &self.config.close_timeout)
            .finish()
    }
}
