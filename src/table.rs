//! Backing-table capability seam.
//!
//! Engines expose tables through a small capability trait (layout access,
//! connect, layout fixing, field lookup) rather than an inheritance
//! hierarchy of storage classes. `SqlTable` is the SQL-backed
//! implementation; the typed binder works against the trait alone.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RecordMiddlewareError;
use crate::executor::Executor;
use crate::schema::{FieldProperties, NameComparison, RowLayout};

/// Flags accepted by [`BackingTable::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    /// Create the backing object when it does not exist yet.
    pub create_if_missing: bool,
    /// Open without write access. Engines that cannot honor this fail with
    /// a configuration fault.
    pub read_only: bool,
}

/// An arbitrary backing table: something with a layout, a connection step,
/// and by-name field lookup.
#[async_trait]
pub trait BackingTable: Send {
    /// Table name as known to the engine.
    fn name(&self) -> &str;

    /// The table's layout, once known.
    fn layout(&self) -> Option<&RowLayout>;

    /// Name-comparison mode for field lookup on this table.
    fn name_comparison(&self) -> NameComparison;

    /// Attach to the backing object in `database`. Populates the layout
    /// from live metadata when none was supplied.
    async fn connect(
        &mut self,
        database: &str,
        options: ConnectOptions,
        layout: Option<&RowLayout>,
    ) -> Result<(), RecordMiddlewareError>;

    /// Fix the table's layout for all subsequent calls. Fails once a
    /// layout has been fixed; re-binding a table is unsupported.
    fn use_layout(&mut self, layout: RowLayout) -> Result<(), RecordMiddlewareError>;

    /// Locate a backing field by name under this table's comparison mode.
    fn field_index(&self, name: &str) -> Option<usize>;

    /// Rewrite declared field properties into the stored form ahead of
    /// layout comparison. Identity by default.
    fn adjust_field_properties(&self, field: &FieldProperties) -> FieldProperties {
        field.clone()
    }
}

/// A table backed by a SQL engine through the executor.
pub struct SqlTable {
    name: String,
    database: Option<String>,
    executor: Arc<Executor>,
    name_comparison: NameComparison,
    layout: Option<RowLayout>,
    layout_fixed: bool,
}

impl SqlTable {
    #[must_use]
    pub fn new(executor: Arc<Executor>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: None,
            executor,
            name_comparison: NameComparison::CaseInsensitive,
            layout: None,
            layout_fixed: false,
        }
    }

    #[must_use]
    pub fn with_name_comparison(mut self, comparison: NameComparison) -> Self {
        self.name_comparison = comparison;
        self
    }

    /// The logical database this table was connected to.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

#[async_trait]
impl BackingTable for SqlTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> Option<&RowLayout> {
        self.layout.as_ref()
    }

    fn name_comparison(&self) -> NameComparison {
        self.name_comparison
    }

    async fn connect(
        &mut self,
        database: &str,
        options: ConnectOptions,
        layout: Option<&RowLayout>,
    ) -> Result<(), RecordMiddlewareError> {
        if options.create_if_missing || options.read_only {
            return Err(RecordMiddlewareError::ConfigError(format!(
                "table '{}': unsupported connect option {options:?} for SQL backing tables",
                self.name
            )));
        }
        let live = self.executor.query_schema(database, &self.name).await?;
        self.layout = Some(match layout {
            Some(declared) => {
                crate::schema::check_layout(&self.name, &live, declared, |f| {
                    self.executor
                        .pool()
                        .driver()
                        .adjust_field_properties(f)
                })?;
                declared.clone()
            }
            None => live,
        });
        self.database = Some(database.to_string());
        Ok(())
    }

    fn use_layout(&mut self, layout: RowLayout) -> Result<(), RecordMiddlewareError> {
        if self.layout_fixed {
            return Err(RecordMiddlewareError::LifecycleError(format!(
                "table '{}' already has a fixed layout; re-binding is unsupported",
                self.name
            )));
        }
        self.layout = Some(layout);
        self.layout_fixed = true;
        Ok(())
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.layout
            .as_ref()
            .and_then(|l| l.field_index(name, self.name_comparison))
    }

    fn adjust_field_properties(&self, field: &FieldProperties) -> FieldProperties {
        self.executor.pool().driver().adjust_field_properties(field)
    }
}

impl std::fmt::Debug for SqlTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTable")
            .field("name", &self.name)
            .field("database", &self.database)
            .field("layout_fixed", &self.layout_fixed)
            .finish()
    }
}
