use std::sync::Arc;

use crate::schema::{NameComparison, RowLayout};
use crate::types::DataValue;

/// A row from a query result.
///
/// Positional values aligned to a `RowLayout` shared by every row in the
/// result set. Rows are ephemeral: they live for the duration of one query
/// call and are discarded after mapping to a caller value.
#[derive(Debug, Clone)]
pub struct Row {
    /// The layout shared across all rows in a result set
    pub layout: Arc<RowLayout>,
    /// The values for this row
    pub values: Vec<DataValue>,
}

impl Row {
    #[must_use]
    pub fn new(layout: Arc<RowLayout>, values: Vec<DataValue>) -> Self {
        Self { layout, values }
    }

    /// Get a value by field name, or None if the layout has no such field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.layout
            .field_index(name, NameComparison::CaseSensitive)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value by position, or None if out of bounds.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }
}

/// The result of a query: mapped rows plus the live layout they share.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub rows: Vec<Row>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: usize,
    layout: Option<Arc<RowLayout>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_layout(layout: Arc<RowLayout>) -> ResultSet {
        ResultSet {
            rows: Vec::new(),
            rows_affected: 0,
            layout: Some(layout),
        }
    }

    #[must_use]
    pub fn layout(&self) -> Option<&Arc<RowLayout>> {
        self.layout.as_ref()
    }

    /// Add a row sharing this result set's layout. No-op when no layout has
    /// been attached.
    pub fn add_row_values(&mut self, values: Vec<DataValue>) {
        if let Some(layout) = &self.layout {
            self.rows.push(Row::new(Arc::clone(layout), values));
            self.rows_affected += 1;
        }
    }

    /// Number of rows in the result set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
