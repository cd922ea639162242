//! Shared test doubles: a scripted driver with deterministic fault
//! injection, a stub backing table, and sample record types.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use record_middleware::prelude::*;

/// Outcome of one scripted execute/query call.
#[derive(Clone, Copy, Debug)]
pub enum Step {
    Ok,
    /// Fails with a retryable connection fault.
    Transient,
    /// Fails with a non-retryable data fault.
    Fatal,
}

#[derive(Debug, Default)]
pub struct DriverStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub calls: AtomicUsize,
    /// Set when two callers overlapped on one connection.
    pub overlap: AtomicBool,
}

pub struct ScriptedDriver {
    stats: Arc<DriverStats>,
    script: Arc<Mutex<VecDeque<Step>>>,
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<DataValue>>,
    switchable: bool,
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(DriverStats::default()),
            script: Arc::new(Mutex::new(VecDeque::new())),
            columns: vec![ColumnMetadata::new("value", 0, DataType::Int64)],
            rows: vec![vec![DataValue::Int(1)]],
            switchable: false,
        }
    }

    pub fn with_result(mut self, columns: Vec<ColumnMetadata>, rows: Vec<Vec<DataValue>>) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    pub fn with_script(self, steps: &[Step]) -> Self {
        self.script.lock().unwrap().extend(steps.iter().copied());
        self
    }

    pub fn switchable(mut self) -> Self {
        self.switchable = true;
        self
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl NativeDriver for ScriptedDriver {
    async fn open(
        &self,
        database: &str,
    ) -> Result<Box<dyn NativeConnection>, RecordMiddlewareError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            stats: Arc::clone(&self.stats),
            script: Arc::clone(&self.script),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            database: database.to_string(),
            open: true,
            busy: AtomicBool::new(false),
        }))
    }

    fn can_change_database(&self) -> bool {
        self.switchable
    }
}

pub struct ScriptedConnection {
    stats: Arc<DriverStats>,
    script: Arc<Mutex<VecDeque<Step>>>,
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<DataValue>>,
    database: String,
    open: bool,
    busy: AtomicBool,
}

impl ScriptedConnection {
    fn next_step(&self) -> Step {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok)
    }

    fn enter(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.stats.overlap.store(true, Ordering::SeqCst);
        }
    }

    fn leave(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    fn fail(step: Step) -> RecordMiddlewareError {
        match step {
            Step::Transient => {
                RecordMiddlewareError::ConnectionError("scripted transient failure".to_string())
            }
            _ => RecordMiddlewareError::DataError("scripted fatal failure".to_string()),
        }
    }
}

#[async_trait]
impl NativeConnection for ScriptedConnection {
    fn database(&self) -> &str {
        &self.database
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn change_database(&mut self, database: &str) -> Result<(), RecordMiddlewareError> {
        self.database = database.to_string();
        Ok(())
    }

    async fn execute(&mut self, _command: &Command) -> Result<usize, RecordMiddlewareError> {
        self.enter();
        tokio::task::yield_now().await;
        let step = self.next_step();
        self.leave();
        match step {
            Step::Ok => Ok(1),
            other => Err(Self::fail(other)),
        }
    }

    async fn query(&mut self, _command: &Command) -> Result<QueryOutcome, RecordMiddlewareError> {
        self.enter();
        tokio::task::yield_now().await;
        let step = self.next_step();
        self.leave();
        match step {
            Step::Ok => Ok(QueryOutcome {
                columns: self.columns.clone(),
                reported_field_count: self.columns.len(),
                rows: self.rows.clone(),
            }),
            other => Err(Self::fail(other)),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A backing table with an in-memory layout and no engine behind it.
pub struct StubBackingTable {
    name: String,
    layout: Option<RowLayout>,
    fixed: bool,
    comparison: NameComparison,
}

impl StubBackingTable {
    pub fn new(name: &str, layout: RowLayout, comparison: NameComparison) -> Self {
        Self {
            name: name.to_string(),
            layout: Some(layout),
            fixed: false,
            comparison,
        }
    }
}

#[async_trait]
impl BackingTable for StubBackingTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> Option<&RowLayout> {
        self.layout.as_ref()
    }

    fn name_comparison(&self) -> NameComparison {
        self.comparison
    }

    async fn connect(
        &mut self,
        _database: &str,
        _options: ConnectOptions,
        layout: Option<&RowLayout>,
    ) -> Result<(), RecordMiddlewareError> {
        if let Some(layout) = layout {
            self.layout = Some(layout.clone());
        }
        Ok(())
    }

    fn use_layout(&mut self, layout: RowLayout) -> Result<(), RecordMiddlewareError> {
        if self.fixed {
            return Err(RecordMiddlewareError::LifecycleError(format!(
                "table '{}' already has a fixed layout",
                self.name
            )));
        }
        self.layout = Some(layout);
        self.fixed = true;
        Ok(())
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.layout
            .as_ref()
            .and_then(|l| l.field_index(name, self.comparison))
    }
}

/// Sample record with an integer identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

impl Record for Person {
    fn layout() -> Result<RowLayout, RecordMiddlewareError> {
        RowLayout::new(vec![
            FieldProperties::new("id", DataType::Int64)
                .identifier()
                .auto_increment(),
            FieldProperties::new("name", DataType::Text),
        ])
    }

    fn to_values(&self) -> Vec<DataValue> {
        vec![
            DataValue::Int(self.id),
            DataValue::Text(self.name.clone()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, RecordMiddlewareError> {
        let id = row
            .get("id")
            .and_then(DataValue::as_int)
            .copied()
            .ok_or_else(|| RecordMiddlewareError::DataError("row has no 'id'".to_string()))?;
        let name = row
            .get("name")
            .and_then(DataValue::as_text)
            .map(ToString::to_string)
            .ok_or_else(|| RecordMiddlewareError::DataError("row has no 'name'".to_string()))?;
        Ok(Person { id, name })
    }
}

/// Sample record keyed by a text code.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeRecord {
    pub code: String,
    pub label: String,
}

impl Record for CodeRecord {
    fn layout() -> Result<RowLayout, RecordMiddlewareError> {
        RowLayout::new(vec![
            FieldProperties::new("code", DataType::Text).identifier(),
            FieldProperties::new("label", DataType::Text),
        ])
    }

    fn to_values(&self) -> Vec<DataValue> {
        vec![
            DataValue::Text(self.code.clone()),
            DataValue::Text(self.label.clone()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, RecordMiddlewareError> {
        let code = row
            .get("code")
            .and_then(DataValue::as_text)
            .map(ToString::to_string)
            .ok_or_else(|| RecordMiddlewareError::DataError("row has no 'code'".to_string()))?;
        let label = row
            .get("label")
            .and_then(DataValue::as_text)
            .map(ToString::to_string)
            .ok_or_else(|| RecordMiddlewareError::DataError("row has no 'label'".to_string()))?;
        Ok(CodeRecord { code, label })
    }
}
