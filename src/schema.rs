//! Record layout descriptors and reconciliation against live result-set
//! metadata.

use serde::{Deserialize, Serialize};

use crate::error::RecordMiddlewareError;
use crate::types::{DataType, DateTimeEncoding, DateTimeKind};

/// How field names are compared when resolving declared fields against a
/// backing schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameComparison {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl NameComparison {
    #[must_use]
    pub fn matches(&self, a: &str, b: &str) -> bool {
        match self {
            NameComparison::CaseSensitive => a == b,
            NameComparison::CaseInsensitive => a.eq_ignore_ascii_case(b),
        }
    }
}

/// Per-field metadata used for marshalling and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProperties {
    /// Field name as known to the backing table
    pub name: String,
    /// Declared type tag
    pub data_type: DataType,
    /// Engine encoding for `DateTime`/`TimeSpan` fields
    pub date_time_encoding: DateTimeEncoding,
    /// Timezone treatment for `DateTime` fields
    pub date_time_kind: DateTimeKind,
    /// Declared size, where the engine reports one
    pub size: Option<usize>,
    /// Whether this is the table's identifier (primary-key equivalent)
    pub is_identifier: bool,
    pub is_auto_increment: bool,
    pub is_unique: bool,
    /// Physical index into the backing row; re-pointed by lenient binding
    pub field_index: usize,
}

impl FieldProperties {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            date_time_encoding: DateTimeEncoding::default(),
            date_time_kind: DateTimeKind::default(),
            size: None,
            is_identifier: false,
            is_auto_increment: false,
            is_unique: false,
            field_index: 0,
        }
    }

    #[must_use]
    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: DateTimeEncoding, kind: DateTimeKind) -> Self {
        self.date_time_encoding = encoding;
        self.date_time_kind = kind;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

/// Immutable ordered description of a record's fields.
///
/// Computed once at bind/open time; rows produced by queries share one
/// layout behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowLayout {
    fields: Vec<FieldProperties>,
    identifier: Option<usize>,
}

impl RowLayout {
    /// Build a layout from fields in declaration order, stamping each
    /// field's physical index with its position.
    ///
    /// # Errors
    ///
    /// Returns `RecordMiddlewareError::DataError` if more than one field is
    /// flagged as the identifier.
    pub fn new(mut fields: Vec<FieldProperties>) -> Result<Self, RecordMiddlewareError> {
        for (position, field) in fields.iter_mut().enumerate() {
            field.field_index = position;
        }
        Self::resolved(fields)
    }

    /// Build a layout keeping the field indices already set on each field.
    /// Used by lenient binding, where indices point into the backing layout.
    ///
    /// # Errors
    ///
    /// Returns `RecordMiddlewareError::DataError` if more than one field is
    /// flagged as the identifier.
    pub fn resolved(fields: Vec<FieldProperties>) -> Result<Self, RecordMiddlewareError> {
        let mut identifier = None;
        for (position, field) in fields.iter().enumerate() {
            if field.is_identifier {
                if identifier.is_some() {
                    return Err(RecordMiddlewareError::DataError(format!(
                        "layout declares more than one identifier field ('{}')",
                        field.name
                    )));
                }
                identifier = Some(position);
            }
        }
        Ok(Self { fields, identifier })
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldProperties] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The identifier field, if the layout declares one.
    #[must_use]
    pub fn identifier(&self) -> Option<&FieldProperties> {
        self.identifier.map(|i| &self.fields[i])
    }

    /// Position of the identifier field within this layout.
    #[must_use]
    pub fn identifier_position(&self) -> Option<usize> {
        self.identifier
    }

    /// Locate a field by name under the given comparison mode.
    #[must_use]
    pub fn field_index(&self, name: &str, comparison: NameComparison) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| comparison.matches(&f.name, name))
    }

    /// Two layouts are compatible iff they have equal field counts and each
    /// field pair is equal.
    #[must_use]
    pub fn compatible(&self, other: &RowLayout) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a == b)
    }
}

/// One column's worth of metadata reported by a native reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    /// Column name; may be empty for computed columns
    pub name: String,
    /// Zero-based position in the result set
    pub ordinal: usize,
    pub size: Option<usize>,
    pub data_type: DataType,
    pub is_identifier: bool,
    pub is_auto_increment: bool,
    pub is_unique: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, ordinal: usize, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            ordinal,
            size: None,
            data_type,
            is_identifier: false,
            is_auto_increment: false,
            is_unique: false,
        }
    }
}

/// Derive a `RowLayout` from live result-set metadata.
///
/// Column names fall back to the stringified positional index when the
/// engine reports an empty name.
///
/// # Errors
///
/// Returns `RecordMiddlewareError::DataError` if the reader's reported field
/// count disagrees with the number of metadata rows.
pub fn read_schema(
    columns: &[ColumnMetadata],
    reported_field_count: usize,
    table: &str,
) -> Result<RowLayout, RecordMiddlewareError> {
    if columns.len() != reported_field_count {
        return Err(RecordMiddlewareError::DataError(format!(
            "schema metadata for table '{table}' reports {} columns but the reader exposes {reported_field_count} fields",
            columns.len()
        )));
    }

    let mut fields = Vec::with_capacity(columns.len());
    for column in columns {
        let name = if column.name.is_empty() {
            column.ordinal.to_string()
        } else {
            column.name.clone()
        };
        let mut field = FieldProperties::new(name, column.data_type);
        field.size = column.size;
        field.is_identifier = column.is_identifier;
        field.is_auto_increment = column.is_auto_increment;
        field.is_unique = column.is_unique;
        fields.push(field);
    }
    RowLayout::new(fields)
}

/// Validate a declared layout against the live layout of `table`.
///
/// `adjust` is the engine's chance to rewrite declared properties into the
/// form it actually stores (e.g. widening small integers) before comparison.
/// Used both at optional per-query validation and at first-bind time.
///
/// # Errors
///
/// Returns `RecordMiddlewareError::DataError` on a field-count mismatch or
/// when any position's adjusted declared properties differ from the live
/// properties.
pub fn check_layout(
    table: &str,
    live: &RowLayout,
    declared: &RowLayout,
    adjust: impl Fn(&FieldProperties) -> FieldProperties,
) -> Result<(), RecordMiddlewareError> {
    if live.len() != declared.len() {
        return Err(RecordMiddlewareError::DataError(format!(
            "table '{table}' has {} fields but the declared layout has {}",
            live.len(),
            declared.len()
        )));
    }

    for (live_field, declared_field) in live.fields().iter().zip(declared.fields()) {
        let adjusted = adjust(declared_field);
        if adjusted != *live_field {
            return Err(RecordMiddlewareError::DataError(format!(
                "table '{table}' field {}: expected {adjusted:?}, found {live_field:?}",
                live_field.field_index
            )));
        }
    }
    Ok(())
}
