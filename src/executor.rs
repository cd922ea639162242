//! Retrying execute/query pipeline.
//!
//! Every operation borrows a pooled connection per attempt, returns it with
//! `force_close = true` on any failure (a connection involved in a failure
//! is never reused), and retries transient faults up to a flat attempt
//! ceiling with no backoff. Structural post-conditions (row and field
//! counts, layout compatibility) are checked after a successful execution
//! and never retried.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use crate::codec;
use crate::driver::{check_parameter_binding, Command, QueryOutcome};
use crate::error::RecordMiddlewareError;
use crate::pool::ConnectionPool;
use crate::results::{ResultSet, Row};
use crate::schema::{check_layout, read_schema, RowLayout};
use crate::types::{DataValue, DatabaseParameter};

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retries after the first attempt; the default of 3 yields 4 attempts.
    pub max_error_retries: u32,
    /// Native command timeout; floored to one second.
    pub command_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_error_retries: 3,
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ExecutorConfig {
    fn effective_timeout(&self) -> Duration {
        cmp::max(self.command_timeout, Duration::from_secs(1))
    }
}

enum Dispatch {
    Execute,
    Query,
}

enum Outcome {
    Affected(usize),
    Results(QueryOutcome),
}

/// Runs execute/query operations against pooled connections.
pub struct Executor {
    pool: Arc<ConnectionPool>,
    config: ExecutorConfig,
}

impl Executor {
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, config: ExecutorConfig) -> Self {
        Self { pool, config }
    }

    /// The pool this executor borrows connections from.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Run a DML/DDL statement, returning the affected-row count.
    ///
    /// # Errors
    ///
    /// Surfaces transient faults only once the retry ceiling is exhausted,
    /// wrapped with database/table/command context.
    pub async fn execute(
        &self,
        database: &str,
        table: &str,
        command: &str,
        params: &[DatabaseParameter],
    ) -> Result<usize, RecordMiddlewareError> {
        let command = self.build_command(table, command, params)?;
        match self
            .run_with_retry(database, table, &command, Dispatch::Execute)
            .await?
        {
            Outcome::Affected(count) => Ok(count),
            Outcome::Results(_) => Err(RecordMiddlewareError::ExecutionError(format!(
                "execute returned a result set {}",
                context(database, table, &command.text)
            ))),
        }
    }

    /// Run a reader and map every row to local typed values.
    ///
    /// With `declared` supplied, the live result-set layout is validated
    /// against it before any row is mapped.
    ///
    /// # Errors
    ///
    /// Transient faults retry up to the ceiling; layout and marshalling
    /// faults surface immediately.
    pub async fn query(
        &self,
        database: &str,
        table: &str,
        command: &str,
        params: &[DatabaseParameter],
        declared: Option<&RowLayout>,
    ) -> Result<ResultSet, RecordMiddlewareError> {
        let command = self.build_command(table, command, params)?;
        let outcome = match self
            .run_with_retry(database, table, &command, Dispatch::Query)
            .await?
        {
            Outcome::Results(outcome) => outcome,
            Outcome::Affected(_) => {
                return Err(RecordMiddlewareError::ExecutionError(format!(
                    "query returned no result set {}",
                    context(database, table, &command.text)
                )));
            }
        };

        let live = read_schema(&outcome.columns, outcome.reported_field_count, table)?;
        // Map with the declared layout when one is given: it carries the
        // date-time encodings the live metadata cannot know.
        let layout = match declared {
            Some(declared) => {
                let driver = Arc::clone(self.pool.driver());
                check_layout(table, &live, declared, |f| driver.adjust_field_properties(f))?;
                Arc::new(declared.clone())
            }
            None => Arc::new(live),
        };
        let mut results = ResultSet::with_layout(Arc::clone(&layout));
        for raw in &outcome.rows {
            let mut values = Vec::with_capacity(raw.len());
            for (field, value) in layout.fields().iter().zip(raw) {
                values.push(codec::to_local_value(field, value)?);
            }
            results.add_row_values(values);
        }
        Ok(results)
    }

    /// Run a reader expected to produce exactly one row.
    ///
    /// # Errors
    ///
    /// Fails with a data fault when the result has zero rows or more than
    /// one row; these post-conditions are never retried.
    pub async fn query_row(
        &self,
        database: &str,
        table: &str,
        command: &str,
        params: &[DatabaseParameter],
        declared: Option<&RowLayout>,
    ) -> Result<Row, RecordMiddlewareError> {
        let mut results = self
            .query(database, table, command, params, declared)
            .await?;
        if results.rows.is_empty() {
            return Err(RecordMiddlewareError::DataError(format!(
                "No data available {}",
                context(database, table, command)
            )));
        }
        if results.rows.len() > 1 {
            return Err(RecordMiddlewareError::DataError(format!(
                "Additional data available {}",
                context(database, table, command)
            )));
        }
        Ok(results.rows.remove(0))
    }

    /// Run a reader expected to produce a single scalar.
    ///
    /// # Errors
    ///
    /// Fails with a data fault when the result has zero rows, more than one
    /// row, or more than one field.
    pub async fn query_value(
        &self,
        database: &str,
        table: &str,
        command: &str,
        params: &[DatabaseParameter],
    ) -> Result<DataValue, RecordMiddlewareError> {
        let mut row = self
            .query_row(database, table, command, params, None)
            .await?;
        if row.layout.len() > 1 {
            return Err(RecordMiddlewareError::DataError(format!(
                "Additional fields available {}",
                context(database, table, command)
            )));
        }
        if row.values.is_empty() {
            return Err(RecordMiddlewareError::DataError(format!(
                "No data available {}",
                context(database, table, command)
            )));
        }
        Ok(row.values.remove(0))
    }

    /// Fetch the live layout of `table` without returning rows.
    ///
    /// # Errors
    ///
    /// Same retry/fault behavior as [`Executor::query`].
    pub async fn query_schema(
        &self,
        database: &str,
        table: &str,
    ) -> Result<RowLayout, RecordMiddlewareError> {
        let text = self.pool.driver().schema_command(table);
        let command = self.build_command(table, &text, &[])?;
        match self
            .run_with_retry(database, table, &command, Dispatch::Query)
            .await?
        {
            Outcome::Results(outcome) => {
                read_schema(&outcome.columns, outcome.reported_field_count, table)
            }
            Outcome::Affected(_) => Err(RecordMiddlewareError::ExecutionError(format!(
                "schema query returned no result set {}",
                context(database, table, &command.text)
            ))),
        }
    }

    fn build_command(
        &self,
        table: &str,
        text: &str,
        params: &[DatabaseParameter],
    ) -> Result<Command, RecordMiddlewareError> {
        check_parameter_binding(self.pool.driver().as_ref(), params)?;
        Ok(Command::new(text, params.to_vec())
            .with_timeout(self.config.effective_timeout())
            .for_table(table))
    }

    async fn run_with_retry(
        &self,
        database: &str,
        table: &str,
        command: &Command,
        dispatch: Dispatch,
    ) -> Result<Outcome, RecordMiddlewareError> {
        let mut attempt: u32 = 1;
        loop {
            let result = match self.pool.get_connection(database).await {
                Ok(mut connection) => {
                    let attempt_result = match dispatch {
                        Dispatch::Execute => {
                            connection.execute(command).await.map(Outcome::Affected)
                        }
                        Dispatch::Query => connection.query(command).await.map(Outcome::Results),
                    };
                    let ok = attempt_result.is_ok();
                    self.pool.return_connection(connection, !ok).await;
                    attempt_result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(error) => {
                    if !error.is_retryable() || attempt > self.config.max_error_retries {
                        return Err(with_context(error, database, table, &command.text));
                    }
                    tracing::warn!(
                        attempt,
                        database,
                        table,
                        error = %error,
                        "transient failure; retrying on a fresh connection"
                    );
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("max_error_retries", &self.config.max_error_retries)
            .field("command_timeout", &self.config.command_timeout)
            .finish()
    }
}

fn context(database: &str, table: &str, command: &str) -> String {
    format!("(database '{database}', table '{table}', command '{command}')")
}

fn with_context(
    error: RecordMiddlewareError,
    database: &str,
    table: &str,
    command: &str,
) -> RecordMiddlewareError {
    let ctx = context(database, table, command);
    match error {
        RecordMiddlewareError::ConnectionError(m) => {
            RecordMiddlewareError::ConnectionError(format!("{m} {ctx}"))
        }
        RecordMiddlewareError::DataError(m) => {
            RecordMiddlewareError::DataError(format!("{m} {ctx}"))
        }
        RecordMiddlewareError::ExecutionError(m) => {
            RecordMiddlewareError::ExecutionError(format!("{m} {ctx}"))
        }
        RecordMiddlewareError::LifecycleError(m) => {
            RecordMiddlewareError::LifecycleError(format!("{m} {ctx}"))
        }
        other => RecordMiddlewareError::ExecutionError(format!("{other} {ctx}")),
    }
}
