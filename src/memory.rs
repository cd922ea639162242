//! In-process memory table engine.
//!
//! `MemoryTable` is deliberately not thread-safe; concurrent callers go
//! through [`SynchronizedTable`](crate::memory::SynchronizedTable), which
//! serializes every operation behind one instance lock.

pub mod facade;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use crate::error::RecordMiddlewareError;
use crate::schema::RowLayout;
use crate::types::{DataType, DataValue};

pub use facade::SynchronizedTable;

/// A committed change to a memory table, as seen by a transaction log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Inserted { id: i64, values: Vec<DataValue> },
    Updated { id: i64, values: Vec<DataValue> },
    Deleted { id: i64 },
}

/// Append sink recording committed changes for later replay or auditing.
///
/// Implementations must be independently thread-safe; the synchronized
/// facade appends without adding its own locking around the sink.
pub trait TransactionLog: Send + Sync {
    fn append(&self, entry: LogEntry);
}

/// A `TransactionLog` that buffers entries in memory.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl InMemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<LogEntry> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionLog for InMemoryLog {
    fn append(&self, entry: LogEntry) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(entry);
    }
}

/// The unlocked single-threaded table contract the facade wraps.
pub trait MemoryEngine: Send {
    fn layout(&self) -> &RowLayout;

    /// Point read by identifier.
    fn get(&self, id: i64) -> Option<Vec<DataValue>>;

    /// Insert one row, assigning an identifier when the row carries none.
    ///
    /// # Errors
    ///
    /// Returns a data fault on arity mismatch or duplicate identifier.
    fn insert(&mut self, values: Vec<DataValue>) -> Result<i64, RecordMiddlewareError>;

    /// Overwrite an existing row.
    ///
    /// # Errors
    ///
    /// Returns a data fault when the row does not exist.
    fn update(&mut self, id: i64, values: Vec<DataValue>) -> Result<(), RecordMiddlewareError>;

    /// Insert-or-overwrite by identifier.
    ///
    /// # Errors
    ///
    /// Returns a data fault on arity mismatch.
    fn replace(&mut self, id: i64, values: Vec<DataValue>) -> Result<i64, RecordMiddlewareError>;

    /// Delete by identifier; false when absent.
    fn delete(&mut self, id: i64) -> bool;

    /// Range scan over identifiers, ascending.
    fn scan(&self, from: Bound<i64>, to: Bound<i64>) -> Vec<(i64, Vec<DataValue>)>;

    fn count(&self) -> usize;

    /// Sum a numeric field across all rows; NULLs are skipped.
    ///
    /// # Errors
    ///
    /// Returns a data fault for an out-of-range field index or a
    /// non-numeric value.
    fn sum(&self, field: usize) -> Result<f64, RecordMiddlewareError>;
}

/// Ordered in-memory table with an auto-incrementing integer identifier.
#[derive(Debug)]
pub struct MemoryTable {
    layout: RowLayout,
    identifier: usize,
    rows: BTreeMap<i64, Vec<DataValue>>,
    next_id: i64,
}

impl MemoryTable {
    /// # Errors
    ///
    /// Returns a configuration fault when the layout lacks an integer
    /// identifier field.
    pub fn new(layout: RowLayout) -> Result<Self, RecordMiddlewareError> {
        let identifier = layout.identifier_position().ok_or_else(|| {
            RecordMiddlewareError::ConfigError(
                "memory table layout needs an identifier field".to_string(),
            )
        })?;
        let id_type = layout.fields()[identifier].data_type;
        if !matches!(
            id_type,
            DataType::Int16 | DataType::Int32 | DataType::Int64
        ) {
            return Err(RecordMiddlewareError::ConfigError(format!(
                "memory table identifier must be an integer field, not {id_type:?}"
            )));
        }
        Ok(Self {
            layout,
            identifier,
            rows: BTreeMap::new(),
            next_id: 1,
        })
    }

    fn check_arity(&self, values: &[DataValue]) -> Result<(), RecordMiddlewareError> {
        if values.len() != self.layout.len() {
            return Err(RecordMiddlewareError::DataError(format!(
                "row has {} values but the layout declares {}",
                values.len(),
                self.layout.len()
            )));
        }
        Ok(())
    }
}

impl MemoryEngine for MemoryTable {
    fn layout(&self) -> &RowLayout {
        &self.layout
    }

    fn get(&self, id: i64) -> Option<Vec<DataValue>> {
        self.rows.get(&id).cloned()
    }

    fn insert(&mut self, mut values: Vec<DataValue>) -> Result<i64, RecordMiddlewareError> {
        self.check_arity(&values)?;
        let id = match values[self.identifier] {
            DataValue::Int(explicit) => {
                if self.rows.contains_key(&explicit) {
                    return Err(RecordMiddlewareError::DataError(format!(
                        "row {explicit} already exists"
                    )));
                }
                explicit
            }
            DataValue::Null => self.next_id,
            ref other => {
                return Err(RecordMiddlewareError::DataError(format!(
                    "identifier value {other:?} is not an integer"
                )));
            }
        };
        self.next_id = self.next_id.max(id + 1);
        values[self.identifier] = DataValue::Int(id);
        self.rows.insert(id, values);
        Ok(id)
    }

    fn update(&mut self, id: i64, mut values: Vec<DataValue>) -> Result<(), RecordMiddlewareError> {
        self.check_arity(&values)?;
        if !self.rows.contains_key(&id) {
            return Err(RecordMiddlewareError::DataError(format!(
                "row {id} not found"
            )));
        }
        values[self.identifier] = DataValue::Int(id);
        self.rows.insert(id, values);
        Ok(())
    }

    fn replace(&mut self, id: i64, mut values: Vec<DataValue>) -> Result<i64, RecordMiddlewareError> {
        self.check_arity(&values)?;
        values[self.identifier] = DataValue::Int(id);
        self.next_id = self.next_id.max(id + 1);
        self.rows.insert(id, values);
        Ok(id)
    }

    fn delete(&mut self, id: i64) -> bool {
        self.rows.remove(&id).is_some()
    }

    fn scan(&self, from: Bound<i64>, to: Bound<i64>) -> Vec<(i64, Vec<DataValue>)> {
        self.rows
            .range((from, to))
            .map(|(id, values)| (*id, values.clone()))
            .collect()
    }

    fn count(&self) -> usize {
        self.rows.len()
    }

    fn sum(&self, field: usize) -> Result<f64, RecordMiddlewareError> {
        if field >= self.layout.len() {
            return Err(RecordMiddlewareError::DataError(format!(
                "field index {field} is outside the layout ({} fields)",
                self.layout.len()
            )));
        }
        let mut total = 0.0;
        for values in self.rows.values() {
            match &values[field] {
                DataValue::Int(i) => total += *i as f64,
                DataValue::Float(f) => total += f,
                DataValue::Null => {}
                other => {
                    return Err(RecordMiddlewareError::DataError(format!(
                        "field index {field} holds non-numeric value {other:?}"
                    )));
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldProperties;

    fn table() -> MemoryTable {
        let layout = RowLayout::new(vec![
            FieldProperties::new("id", DataType::Int64)
                .identifier()
                .auto_increment(),
            FieldProperties::new("name", DataType::Text),
            FieldProperties::new("score", DataType::Float),
        ])
        .unwrap();
        MemoryTable::new(layout).unwrap()
    }

    fn row(name: &str, score: f64) -> Vec<DataValue> {
        vec![
            DataValue::Null,
            DataValue::Text(name.to_string()),
            DataValue::Float(score),
        ]
    }

    #[test]
    fn insert_assigns_sequential_identifiers() {
        let mut t = table();
        assert_eq!(t.insert(row("a", 1.0)).unwrap(), 1);
        assert_eq!(t.insert(row("b", 2.0)).unwrap(), 2);
        assert_eq!(t.count(), 2);
        assert_eq!(
            t.get(1).unwrap()[1],
            DataValue::Text("a".to_string())
        );
    }

    #[test]
    fn explicit_identifier_advances_the_sequence() {
        let mut t = table();
        let mut explicit = row("x", 0.0);
        explicit[0] = DataValue::Int(10);
        assert_eq!(t.insert(explicit).unwrap(), 10);
        assert_eq!(t.insert(row("y", 0.0)).unwrap(), 11);
    }

    #[test]
    fn duplicate_identifier_is_a_data_error() {
        let mut t = table();
        let mut a = row("a", 0.0);
        a[0] = DataValue::Int(5);
        t.insert(a.clone()).unwrap();
        assert!(matches!(
            t.insert(a),
            Err(RecordMiddlewareError::DataError(_))
        ));
    }

    #[test]
    fn update_requires_existing_row() {
        let mut t = table();
        assert!(t.update(7, row("a", 0.0)).is_err());
        let id = t.insert(row("a", 0.0)).unwrap();
        t.update(id, row("a2", 0.5)).unwrap();
        assert_eq!(
            t.get(id).unwrap()[1],
            DataValue::Text("a2".to_string())
        );
    }

    #[test]
    fn scan_and_sum_cover_ranges() {
        let mut t = table();
        for i in 0..5 {
            t.insert(row(&format!("r{i}"), f64::from(i))).unwrap();
        }
        let mid = t.scan(Bound::Included(2), Bound::Excluded(4));
        assert_eq!(mid.iter().map(|(id, _)| *id).collect::<Vec<_>>(), [2, 3]);
        assert!((t.sum(2).unwrap() - 10.0).abs() < f64::EPSILON);
        assert!(t.sum(1).is_err());
    }
}
