//! Convenient imports for common functionality.
//!
//! Re-exports the most commonly used types so application code can get
//! started with a single `use`.

pub use crate::codec::{escape_field_value, escape_string, to_database_value, to_local_value};
pub use crate::driver::{Command, EngineConfig, NativeConnection, NativeDriver, QueryOutcome};
pub use crate::error::RecordMiddlewareError;
pub use crate::executor::{Executor, ExecutorConfig};
pub use crate::memory::{
    InMemoryLog, LogEntry, MemoryEngine, MemoryTable, SynchronizedTable, TransactionLog,
};
pub use crate::pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use crate::results::{ResultSet, Row};
pub use crate::schema::{
    check_layout, read_schema, ColumnMetadata, FieldProperties, NameComparison, RowLayout,
};
pub use crate::table::{BackingTable, ConnectOptions, SqlTable};
pub use crate::typed::{BindMode, KeyValue, Record, TableBinder, TypedTableBinding};
pub use crate::types::{
    DataType, DataValue, DatabaseParameter, DateTimeEncoding, DateTimeKind, EngineKind,
};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
