//! Native driver abstraction.
//!
//! Engines plug in through a strategy object injected at construction; the
//! pool and executor never name a concrete driver type. Implementations
//! report transient failures as `RecordMiddlewareError::ConnectionError` (or
//! an engine error that classifies as retryable) so the executor's retry
//! loop can act on plain result values.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RecordMiddlewareError;
use crate::schema::{ColumnMetadata, FieldProperties};
use crate::types::{DataValue, DatabaseParameter, EngineKind};

/// One parameterized statement ready for a native engine.
#[derive(Debug, Clone)]
pub struct Command {
    /// Statement text in the engine's dialect
    pub text: String,
    /// Parameters, bound by name or position depending on the engine
    pub parameters: Vec<DatabaseParameter>,
    /// Execution timeout; the executor floors this to one second
    pub timeout: Duration,
    /// Backing table the statement targets, when known; used for
    /// structural-metadata lookups and error context
    pub table: Option<String>,
}

impl Command {
    pub fn new(text: impl Into<String>, parameters: Vec<DatabaseParameter>) -> Self {
        Self {
            text: text.into(),
            parameters,
            timeout: Duration::from_secs(30),
            table: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn for_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// Raw result of running a reader: column metadata plus engine-native row
/// values, before any marshalling to local types.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub columns: Vec<ColumnMetadata>,
    /// Field count the reader itself reports; `read_schema` cross-checks
    /// this against `columns.len()`
    pub reported_field_count: usize,
    pub rows: Vec<Vec<DataValue>>,
}

/// One live native connection. Exclusively owned: by the pool while idle,
/// by a single borrower otherwise.
#[async_trait]
pub trait NativeConnection: Send {
    /// Logical database name this connection is currently bound to.
    fn database(&self) -> &str;

    /// Whether the native handle is still usable.
    fn is_open(&self) -> bool;

    /// Re-point this connection at another logical database. Only called
    /// when the driver advertises `can_change_database`.
    async fn change_database(&mut self, database: &str) -> Result<(), RecordMiddlewareError>;

    /// Run a DML/DDL statement, returning the affected-row count.
    async fn execute(&mut self, command: &Command) -> Result<usize, RecordMiddlewareError>;

    /// Run a reader, returning raw rows plus result-set metadata.
    async fn query(&mut self, command: &Command) -> Result<QueryOutcome, RecordMiddlewareError>;

    /// Close the native handle. Idempotent.
    async fn close(&mut self);
}

/// Factory/strategy for one engine family.
#[async_trait]
pub trait NativeDriver: Send + Sync {
    /// Open a brand-new native connection to the named logical database.
    async fn open(
        &self,
        database: &str,
    ) -> Result<Box<dyn NativeConnection>, RecordMiddlewareError>;

    /// Whether statements bind parameters by name; positional otherwise.
    fn supports_named_parameters(&self) -> bool {
        true
    }

    /// Whether an open connection can be re-pointed at another database.
    fn can_change_database(&self) -> bool {
        false
    }

    /// Quote an identifier for this engine's dialect.
    fn escape_field_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Statement that yields the table's schema without returning rows.
    fn schema_command(&self, table: &str) -> String {
        format!("SELECT * FROM {} WHERE 1 = 0", self.escape_field_name(table))
    }

    /// Rewrite declared field properties into the form this engine actually
    /// stores, ahead of layout comparison. Identity by default.
    fn adjust_field_properties(&self, field: &FieldProperties) -> FieldProperties {
        field.clone()
    }
}

/// Engine selection, typically parsed straight from a binary's arguments.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Directory the engine stores databases under, for file-backed
    /// engines.
    pub root: Option<PathBuf>,
}

impl EngineConfig {
    /// Build the driver strategy this configuration names.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault for engine kinds that do not speak
    /// the driver contract (memory tables are used directly through
    /// [`crate::memory::SynchronizedTable`]).
    pub fn driver(&self) -> Result<Arc<dyn NativeDriver>, RecordMiddlewareError> {
        match self.kind {
            #[cfg(feature = "sqlite")]
            EngineKind::Sqlite => {
                let driver: Arc<dyn NativeDriver> = match &self.root {
                    Some(root) => Arc::new(crate::sqlite::SqliteDriver::new(root)),
                    None => Arc::new(crate::sqlite::SqliteDriver::in_memory()),
                };
                Ok(driver)
            }
            EngineKind::Memory => Err(RecordMiddlewareError::ConfigError(
                "memory tables do not use the driver contract; wrap a MemoryTable in \
                 SynchronizedTable instead"
                    .to_string(),
            )),
        }
    }
}

/// Validate parameters against the engine's binding style: named engines
/// require every parameter to carry a name; positional engines bind in
/// declaration order.
pub(crate) fn check_parameter_binding(
    driver: &dyn NativeDriver,
    parameters: &[DatabaseParameter],
) -> Result<(), RecordMiddlewareError> {
    if driver.supports_named_parameters() {
        if let Some(unnamed) = parameters.iter().position(|p| p.name.is_empty()) {
            return Err(RecordMiddlewareError::ParameterError(format!(
                "parameter {unnamed} has no name; this engine binds parameters by name"
            )));
        }
    }
    Ok(())
}
