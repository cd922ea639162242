//! Coarse-locking facade for a non-thread-safe memory engine.
//!
//! One instance-wide mutex serializes every operation for its full
//! duration, so the batch overloads are atomic with respect to concurrent
//! readers and writers of the same instance. The lock never spans calls;
//! multi-step atomicity requires the batch forms. A reader/writer split
//! would raise scan throughput; mutual exclusion is the correctness
//! baseline and stays until contention shows up in practice.

use std::ops::{Bound, RangeBounds};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RecordMiddlewareError;
use crate::memory::{LogEntry, MemoryEngine, TransactionLog};
use crate::schema::RowLayout;
use crate::types::DataValue;

struct Inner<E> {
    engine: E,
    log: Option<Arc<dyn TransactionLog>>,
}

/// Thread-safe wrapper around one memory engine instance.
///
/// Direct access to the wrapped engine from another path is a convention
/// violation; all shared use goes through this facade.
pub struct SynchronizedTable<E: MemoryEngine> {
    inner: Mutex<Inner<E>>,
}

impl<E: MemoryEngine> SynchronizedTable<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            inner: Mutex::new(Inner { engine, log: None }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Attach a transaction-log sink. Lock-protected; the sink itself is
    /// expected to be independently thread-safe.
    pub fn attach_log(&self, log: Arc<dyn TransactionLog>) {
        self.lock().log = Some(log);
    }

    /// Detach the current sink, returning it.
    pub fn detach_log(&self) -> Option<Arc<dyn TransactionLog>> {
        self.lock().log.take()
    }

    /// The wrapped engine's layout.
    #[must_use]
    pub fn layout(&self) -> RowLayout {
        self.lock().engine.layout().clone()
    }

    /// Point read by identifier.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Vec<DataValue>> {
        self.lock().engine.get(id)
    }

    /// Insert one row.
    ///
    /// # Errors
    ///
    /// Propagates the engine's data faults.
    pub fn insert(&self, values: Vec<DataValue>) -> Result<i64, RecordMiddlewareError> {
        let mut inner = self.lock();
        let id = inner.engine.insert(values)?;
        log_change(&inner, |values| LogEntry::Inserted { id, values }, id);
        Ok(id)
    }

    /// Insert a batch of rows atomically with respect to concurrent
    /// access. Stops at the first failing row; prior rows stay inserted
    /// and the error names none of them.
    ///
    /// # Errors
    ///
    /// Propagates the engine's data faults.
    pub fn insert_many(
        &self,
        rows: impl IntoIterator<Item = Vec<DataValue>>,
    ) -> Result<Vec<i64>, RecordMiddlewareError> {
        let mut inner = self.lock();
        let mut ids = Vec::new();
        for values in rows {
            let id = inner.engine.insert(values)?;
            log_change(&inner, |values| LogEntry::Inserted { id, values }, id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Overwrite an existing row.
    ///
    /// # Errors
    ///
    /// Propagates the engine's data faults.
    pub fn update(&self, id: i64, values: Vec<DataValue>) -> Result<(), RecordMiddlewareError> {
        let mut inner = self.lock();
        inner.engine.update(id, values)?;
        log_change(&inner, |values| LogEntry::Updated { id, values }, id);
        Ok(())
    }

    /// Overwrite a batch of rows atomically with respect to concurrent
    /// access.
    ///
    /// # Errors
    ///
    /// Propagates the engine's data faults.
    pub fn update_many(
        &self,
        rows: impl IntoIterator<Item = (i64, Vec<DataValue>)>,
    ) -> Result<(), RecordMiddlewareError> {
        let mut inner = self.lock();
        for (id, values) in rows {
            inner.engine.update(id, values)?;
            log_change(&inner, |values| LogEntry::Updated { id, values }, id);
        }
        Ok(())
    }

    /// Insert-or-overwrite by identifier.
    ///
    /// # Errors
    ///
    /// Propagates the engine's data faults.
    pub fn replace(&self, id: i64, values: Vec<DataValue>) -> Result<i64, RecordMiddlewareError> {
        let mut inner = self.lock();
        let id = inner.engine.replace(id, values)?;
        log_change(&inner, |values| LogEntry::Updated { id, values }, id);
        Ok(id)
    }

    /// Delete by identifier; false when absent.
    pub fn delete(&self, id: i64) -> bool {
        let mut inner = self.lock();
        let removed = inner.engine.delete(id);
        if removed {
            if let Some(log) = &inner.log {
                log.append(LogEntry::Deleted { id });
            }
        }
        removed
    }

    /// Delete a batch, returning how many rows existed.
    pub fn delete_many(&self, ids: impl IntoIterator<Item = i64>) -> usize {
        let mut inner = self.lock();
        let mut removed = 0;
        for id in ids {
            if inner.engine.delete(id) {
                removed += 1;
                if let Some(log) = &inner.log {
                    log.append(LogEntry::Deleted { id });
                }
            }
        }
        removed
    }

    /// Range scan over identifiers; the whole scan runs under the lock.
    #[must_use]
    pub fn find(&self, range: impl RangeBounds<i64>) -> Vec<(i64, Vec<DataValue>)> {
        let from: Bound<i64> = range.start_bound().cloned();
        let to: Bound<i64> = range.end_bound().cloned();
        self.lock().engine.scan(from, to)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().engine.count()
    }

    /// Sum a numeric field across all rows.
    ///
    /// # Errors
    ///
    /// Propagates the engine's data faults.
    pub fn sum(&self, field: usize) -> Result<f64, RecordMiddlewareError> {
        self.lock().engine.sum(field)
    }

    /// Unwrap the engine, discarding the facade.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self.inner.into_inner() {
            Ok(inner) => inner.engine,
            Err(poisoned) => poisoned.into_inner().engine,
        }
    }
}

fn log_change<E: MemoryEngine>(
    inner: &Inner<E>,
    entry: impl FnOnce(Vec<DataValue>) -> LogEntry,
    id: i64,
) {
    if let Some(log) = &inner.log {
        let values = inner.engine.get(id).unwrap_or_default();
        log.append(entry(values));
    }
}
