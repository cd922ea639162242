use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::ToSql;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::driver::{Command, NativeConnection, QueryOutcome};
use crate::error::RecordMiddlewareError;
use crate::schema::ColumnMetadata;
use crate::types::{DataType, DataValue};

use super::meta;
use super::params::{self, Bound};

type SharedConnection = Arc<Mutex<rusqlite::Connection>>;

/// One native `SQLite` connection behind a shared blocking-lock handle.
pub struct SqliteConnection {
    handle: SharedConnection,
    database: String,
    open: bool,
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection, database: &str) -> Self {
        Self {
            handle: Arc::new(Mutex::new(conn)),
            database: database.to_string(),
            open: true,
        }
    }

    fn handle(&self) -> SharedConnection {
        Arc::clone(&self.handle)
    }

    fn ensure_open(&self) -> Result<(), RecordMiddlewareError> {
        if self.open {
            Ok(())
        } else {
            Err(RecordMiddlewareError::LifecycleError(format!(
                "sqlite connection to '{}' is closed",
                self.database
            )))
        }
    }
}

async fn run_blocking<F, R>(conn: SharedConnection, func: F) -> Result<R, RecordMiddlewareError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, RecordMiddlewareError> + Send + 'static,
    R: Send + 'static,
{
    spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| {
        RecordMiddlewareError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
    })?
}

fn named_refs(pairs: &[(String, rusqlite::types::Value)]) -> Vec<(&str, &dyn ToSql)> {
    pairs
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect()
}

#[async_trait]
impl NativeConnection for SqliteConnection {
    fn database(&self) -> &str {
        &self.database
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn change_database(&mut self, _database: &str) -> Result<(), RecordMiddlewareError> {
        Err(RecordMiddlewareError::ConfigError(
            "sqlite cannot re-point an open connection at another database".to_string(),
        ))
    }

    async fn execute(&mut self, command: &Command) -> Result<usize, RecordMiddlewareError> {
        self.ensure_open()?;
        let text = command.text.clone();
        let timeout = command.timeout;
        let bound = params::convert(&command.parameters)?;
        run_blocking(self.handle(), move |conn| {
            conn.busy_timeout(timeout)?;
            let mut stmt = conn.prepare(&text)?;
            let affected = match &bound {
                Bound::Named(pairs) => stmt.execute(&named_refs(pairs)[..])?,
                Bound::Positional(values) => {
                    stmt.execute(rusqlite::params_from_iter(values.iter()))?
                }
            };
            Ok(affected)
        })
        .await
    }

    async fn query(&mut self, command: &Command) -> Result<QueryOutcome, RecordMiddlewareError> {
        self.ensure_open()?;
        let text = command.text.clone();
        let timeout = command.timeout;
        let table = command.table.clone();
        let bound = params::convert(&command.parameters)?;
        run_blocking(self.handle(), move |conn| {
            conn.busy_timeout(timeout)?;
            let table_meta = match &table {
                Some(table) => Some(meta::table_metadata(conn, table)?),
                None => None,
            };

            let mut stmt = conn.prepare(&text)?;
            let column_count = stmt.column_count();
            let names: Vec<String> = stmt
                .column_names()
                .iter()
                .map(|s| (*s).to_string())
                .collect();

            let mut raw_rows: Vec<Vec<DataValue>> = Vec::new();
            {
                let refs;
                let mut rows = match &bound {
                    Bound::Named(pairs) => {
                        refs = named_refs(pairs);
                        stmt.query(&refs[..])?
                    }
                    Bound::Positional(values) => {
                        stmt.query(rusqlite::params_from_iter(values.iter()))?
                    }
                };
                while let Some(row) = rows.next()? {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        values.push(params::from_value_ref(row.get_ref(i)?));
                    }
                    raw_rows.push(values);
                }
            }

            let columns = names
                .iter()
                .enumerate()
                .map(|(ordinal, name)| {
                    let info = table_meta
                        .as_ref()
                        .and_then(|m| m.iter().find(|c| c.name.eq_ignore_ascii_case(name)));
                    let mut column = ColumnMetadata::new(
                        name.clone(),
                        ordinal,
                        info.map_or_else(|| infer_column_type(ordinal, &raw_rows), |i| i.data_type),
                    );
                    if let Some(info) = info {
                        column.is_identifier = info.is_identifier;
                        column.is_auto_increment = info.is_auto_increment;
                        column.is_unique = info.is_unique;
                    }
                    column
                })
                .collect();

            Ok(QueryOutcome {
                columns,
                reported_field_count: column_count,
                rows: raw_rows,
            })
        })
        .await
    }

    async fn close(&mut self) {
        self.open = false;
    }
}

/// Fallback typing for computed columns the pragmas cannot describe: infer
/// from the first non-null value, defaulting to text.
fn infer_column_type(ordinal: usize, rows: &[Vec<DataValue>]) -> DataType {
    for row in rows {
        match row.get(ordinal) {
            Some(DataValue::Int(_)) => return DataType::Int64,
            Some(DataValue::Float(_)) => return DataType::Float,
            Some(DataValue::Text(_)) => return DataType::Text,
            Some(DataValue::Blob(_)) => return DataType::Binary,
            _ => {}
        }
    }
    DataType::Text
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("database", &self.database)
            .field("open", &self.open)
            .finish()
    }
}
