//! Typed-table binding: match a key type and a record type to an arbitrary
//! backing table.
//!
//! Records describe their shape through an explicit layout descriptor,
//! validated once at bind time, never per call. Binding fixes the backing
//! table's layout; the identifier field must round-trip through the key
//! type without value loss.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec;
use crate::error::RecordMiddlewareError;
use crate::results::Row;
use crate::schema::{check_layout, FieldProperties, RowLayout};
use crate::table::BackingTable;
use crate::types::{DataType, DataValue, DatabaseParameter};

/// A key type usable for a table's identifier field.
pub trait KeyValue: Sized + Clone + PartialEq + Send {
    /// Convert an identifier value into this key type.
    ///
    /// # Errors
    ///
    /// Returns a type fault when the value's shape cannot be represented.
    fn from_value(value: &DataValue) -> Result<Self, RecordMiddlewareError>;

    /// Convert this key back into the identifier's value form.
    fn to_value(&self) -> DataValue;
}

impl KeyValue for i64 {
    fn from_value(value: &DataValue) -> Result<Self, RecordMiddlewareError> {
        match value {
            DataValue::Int(i) => Ok(*i),
            other => Err(RecordMiddlewareError::TypeError(format!(
                "identifier value {other:?} is not an integer"
            ))),
        }
    }

    fn to_value(&self) -> DataValue {
        DataValue::Int(*self)
    }
}

impl KeyValue for i32 {
    fn from_value(value: &DataValue) -> Result<Self, RecordMiddlewareError> {
        match value {
            DataValue::Int(i) => i32::try_from(*i).map_err(|_| {
                RecordMiddlewareError::TypeError(format!(
                    "identifier value {i} does not fit a 32-bit key"
                ))
            }),
            other => Err(RecordMiddlewareError::TypeError(format!(
                "identifier value {other:?} is not an integer"
            ))),
        }
    }

    fn to_value(&self) -> DataValue {
        DataValue::Int(i64::from(*self))
    }
}

impl KeyValue for String {
    fn from_value(value: &DataValue) -> Result<Self, RecordMiddlewareError> {
        match value {
            DataValue::Text(s) => Ok(s.clone()),
            other => Err(RecordMiddlewareError::TypeError(format!(
                "identifier value {other:?} is not text"
            ))),
        }
    }

    fn to_value(&self) -> DataValue {
        DataValue::Text(self.clone())
    }
}

/// A record type with an explicit, validated-once layout descriptor.
pub trait Record: Sized + Send {
    /// The declared layout: name, type tag, and structural flags per field.
    ///
    /// # Errors
    ///
    /// Returns a data fault when the declaration itself is invalid (e.g.
    /// two identifier fields).
    fn layout() -> Result<RowLayout, RecordMiddlewareError>;

    /// This record's field values, in declaration order.
    fn to_values(&self) -> Vec<DataValue>;

    /// Rebuild a record from a mapped row.
    ///
    /// # Errors
    ///
    /// Returns a type or data fault when the row cannot be represented.
    fn from_row(row: &Row) -> Result<Self, RecordMiddlewareError>;
}

/// Layout-matching strictness for binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// Declared layout must already match the backing layout field for
    /// field.
    #[default]
    Strict,
    /// Resolve declared fields to backing fields by name; extra backing
    /// fields are ignored.
    IgnoreMissingFields,
}

/// Binds a key type and record type to a named backing table.
pub struct TableBinder<K, R> {
    mode: BindMode,
    _marker: PhantomData<fn() -> (K, R)>,
}

impl<K: KeyValue, R: Record> Default for TableBinder<K, R> {
    fn default() -> Self {
        Self::new(BindMode::default())
    }
}

impl<K: KeyValue, R: Record> TableBinder<K, R> {
    #[must_use]
    pub fn new(mode: BindMode) -> Self {
        Self {
            mode,
            _marker: PhantomData,
        }
    }

    /// Validate the declared record shape against `table` and fix the
    /// table's layout.
    ///
    /// # Errors
    ///
    /// - Data fault: layout mismatch (strict), missing declared field or
    ///   ambiguous resolution (lenient), or no identifier field.
    /// - Type fault: the identifier's domain does not round-trip through
    ///   `K` without value loss.
    pub fn bind<T: BackingTable>(
        &self,
        table: &mut T,
    ) -> Result<TypedTableBinding<K, R>, RecordMiddlewareError> {
        let declared = R::layout()?;
        let live = table
            .layout()
            .ok_or_else(|| {
                RecordMiddlewareError::ConfigError(format!(
                    "table '{}' has no layout; connect it before binding",
                    table.name()
                ))
            })?
            .clone();

        let resolved = match self.mode {
            BindMode::Strict => {
                check_layout(table.name(), &live, &declared, |f| {
                    table.adjust_field_properties(f)
                })?;
                declared
            }
            BindMode::IgnoreMissingFields => resolve_by_name(table, &declared)?,
        };

        let identifier = resolved.identifier().cloned().ok_or_else(|| {
            RecordMiddlewareError::DataError(format!(
                "table '{}' resolved layout has no identifier field",
                table.name()
            ))
        })?;
        let backing = live.fields().get(identifier.field_index).ok_or_else(|| {
            RecordMiddlewareError::DataError(format!(
                "table '{}' identifier index {} is outside the backing layout",
                table.name(),
                identifier.field_index
            ))
        })?;
        probe_key_round_trip::<K>(table.name(), backing)?;

        table.use_layout(resolved.clone())?;
        Ok(TypedTableBinding {
            table_name: table.name().to_string(),
            layout: Arc::new(resolved),
            _marker: PhantomData,
        })
    }
}

/// Lenient resolution: locate each declared field in the backing layout by
/// name, re-pointing its physical index; unresolved or doubly-resolved
/// fields fail.
fn resolve_by_name<T: BackingTable>(
    table: &T,
    declared: &RowLayout,
) -> Result<RowLayout, RecordMiddlewareError> {
    let mut fields = Vec::with_capacity(declared.len());
    for field in declared.fields() {
        let index = table.field_index(&field.name).ok_or_else(|| {
            RecordMiddlewareError::DataError(format!(
                "field '{}' was not found in table '{}'",
                field.name,
                table.name()
            ))
        })?;
        let mut resolved = field.clone();
        resolved.field_index = index;
        fields.push(resolved);
    }
    for (i, a) in fields.iter().enumerate() {
        if let Some(b) = fields[i + 1..]
            .iter()
            .find(|b| b.field_index == a.field_index)
        {
            return Err(RecordMiddlewareError::DataError(format!(
                "fields '{}' and '{}' both resolved to backing field {} of table '{}'",
                a.name,
                b.name,
                a.field_index,
                table.name()
            )));
        }
    }
    RowLayout::resolved(fields)
}

/// A representative default for the field's domain, used to probe whether a
/// key type can faithfully represent it.
fn representative_value(field: &FieldProperties) -> DataValue {
    match field.data_type {
        DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::Enum => DataValue::Int(42),
        DataType::Float => DataValue::Float(1.5),
        DataType::Decimal => DataValue::Decimal("1.5".to_string()),
        DataType::Text | DataType::UserDefined => DataValue::Text("key".to_string()),
        DataType::Binary => DataValue::Blob(vec![1, 2, 3]),
        DataType::Bool => DataValue::Bool(true),
        DataType::DateTime => DataValue::Timestamp(codec::zero_datetime()),
        DataType::TimeSpan => DataValue::Interval(chrono::Duration::seconds(1)),
    }
}

fn probe_key_round_trip<K: KeyValue>(
    table: &str,
    backing: &FieldProperties,
) -> Result<(), RecordMiddlewareError> {
    let probe = representative_value(backing);
    let key = K::from_value(&probe).map_err(|e| {
        RecordMiddlewareError::TypeError(format!(
            "key type cannot represent identifier '{}' of table '{table}': {e}",
            backing.name
        ))
    })?;
    if key.to_value() != probe {
        return Err(RecordMiddlewareError::TypeError(format!(
            "key type does not round-trip identifier '{}' of table '{table}' without loss",
            backing.name
        )));
    }
    Ok(())
}

/// A validated binding of `K` + `R` to a named backing table.
pub struct TypedTableBinding<K, R> {
    table_name: String,
    layout: Arc<RowLayout>,
    _marker: PhantomData<fn() -> (K, R)>,
}

impl<K: KeyValue, R: Record> TypedTableBinding<K, R> {
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The resolved layout fixed at bind time.
    #[must_use]
    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    /// Extract the key from a record.
    ///
    /// # Errors
    ///
    /// Returns a type fault when the record's identifier value cannot be
    /// represented by `K`.
    pub fn key_of(&self, record: &R) -> Result<K, RecordMiddlewareError> {
        let position = self.layout.identifier_position().ok_or_else(|| {
            RecordMiddlewareError::DataError(format!(
                "table '{}' binding has no identifier field",
                self.table_name
            ))
        })?;
        let values = record.to_values();
        let value = values.get(position).ok_or_else(|| {
            RecordMiddlewareError::DataError(format!(
                "record for table '{}' has {} values but the identifier sits at {position}",
                self.table_name,
                values.len()
            ))
        })?;
        K::from_value(value)
    }

    /// Marshal a record into named parameters, one per declared field.
    ///
    /// # Errors
    ///
    /// Propagates marshalling faults from the value codec.
    pub fn to_parameters(
        &self,
        record: &R,
    ) -> Result<Vec<DatabaseParameter>, RecordMiddlewareError> {
        let values = record.to_values();
        if values.len() != self.layout.len() {
            return Err(RecordMiddlewareError::DataError(format!(
                "record for table '{}' has {} values but the layout declares {}",
                self.table_name,
                values.len(),
                self.layout.len()
            )));
        }
        self.layout
            .fields()
            .iter()
            .zip(&values)
            .map(|(field, value)| {
                codec::to_database_value(field, value)
                    .map(|encoded| DatabaseParameter::new(field.name.clone(), encoded))
            })
            .collect()
    }

    /// Rebuild a record from a mapped row.
    ///
    /// # Errors
    ///
    /// Propagates `R::from_row` faults.
    pub fn from_row(&self, row: &Row) -> Result<R, RecordMiddlewareError> {
        R::from_row(row)
    }
}

impl<K, R> std::fmt::Debug for TypedTableBinding<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedTableBinding")
            .field("table_name", &self.table_name)
            .field("fields", &self.layout.len())
            .finish()
    }
}
