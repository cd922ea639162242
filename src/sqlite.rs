//! Embedded `SQLite` engine adapter.
//!
//! Implements the native-driver strategy over `rusqlite`. All engine calls
//! run on the blocking thread pool against a shared connection handle.

mod connection;
mod meta;
mod params;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::task::spawn_blocking;

use crate::driver::{NativeConnection, NativeDriver};
use crate::error::RecordMiddlewareError;
use crate::schema::FieldProperties;
use crate::types::{DataType, DateTimeEncoding, DateTimeKind};

pub use connection::SqliteConnection;

/// Driver strategy for the embedded `SQLite` engine.
///
/// Logical database names map to `<root>/<name>.db3`. Without a root, every
/// open yields an independent in-memory database: useful for tests, useless
/// for sharing state across connections.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    root: Option<PathBuf>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self { root: None }
    }
}

#[async_trait]
impl NativeDriver for SqliteDriver {
    async fn open(
        &self,
        database: &str,
    ) -> Result<Box<dyn NativeConnection>, RecordMiddlewareError> {
        let target = self
            .root
            .as_ref()
            .map(|root| root.join(format!("{database}.db3")));
        let conn = spawn_blocking(move || match target {
            Some(path) => rusqlite::Connection::open(path),
            None => rusqlite::Connection::open_in_memory(),
        })
        .await
        .map_err(|e| {
            RecordMiddlewareError::ConnectionError(format!("sqlite open join error: {e}"))
        })??;
        Ok(Box::new(SqliteConnection::new(conn, database)))
    }

    fn supports_named_parameters(&self) -> bool {
        true
    }

    fn can_change_database(&self) -> bool {
        false
    }

    /// Rewrite declared properties into what `SQLite` actually stores:
    /// sizes are not tracked, and encoded date-time/time-span fields land
    /// in their storage type.
    fn adjust_field_properties(&self, field: &FieldProperties) -> FieldProperties {
        let mut adjusted = field.clone();
        adjusted.size = None;
        adjusted.data_type = match field.data_type {
            DataType::DateTime => match field.date_time_encoding {
                DateTimeEncoding::Native => DataType::DateTime,
                DateTimeEncoding::Ticks | DateTimeEncoding::HumanReadableTicks => DataType::Int64,
                DateTimeEncoding::DecimalSeconds => DataType::Decimal,
                DateTimeEncoding::DoubleSeconds => DataType::Float,
            },
            DataType::TimeSpan => match field.date_time_encoding {
                DateTimeEncoding::Native | DateTimeEncoding::DecimalSeconds => DataType::Decimal,
                DateTimeEncoding::Ticks | DateTimeEncoding::HumanReadableTicks => DataType::Int64,
                DateTimeEncoding::DoubleSeconds => DataType::Float,
            },
            DataType::Enum => DataType::Int64,
            other => other,
        };
        adjusted.date_time_encoding = DateTimeEncoding::Native;
        adjusted.date_time_kind = DateTimeKind::Unspecified;
        adjusted
    }
}
