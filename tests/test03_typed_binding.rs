mod common;

use std::sync::Arc;

use common::{CodeRecord, Person, StubBackingTable};
use record_middleware::prelude::*;

fn backing_layout() -> RowLayout {
    RowLayout::new(vec![
        FieldProperties::new("Id", DataType::Int64)
            .identifier()
            .auto_increment(),
        FieldProperties::new("Name", DataType::Text),
        FieldProperties::new("CreatedAt", DataType::DateTime),
    ])
    .unwrap()
}

#[test]
fn lenient_binding_resolves_fields_by_name() -> Result<(), RecordMiddlewareError> {
    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseInsensitive,
    );
    let binding = TableBinder::<i64, Person>::new(BindMode::IgnoreMissingFields)
        .bind(&mut table)?;

    let indices: Vec<usize> = binding
        .layout()
        .fields()
        .iter()
        .map(|f| f.field_index)
        .collect();
    assert_eq!(indices, [0, 1]);
    Ok(())
}

#[test]
fn lenient_binding_names_the_missing_field() {
    #[derive(Debug)]
    struct Titled;
    impl Record for Titled {
        fn layout() -> Result<RowLayout, RecordMiddlewareError> {
            RowLayout::new(vec![
                FieldProperties::new("name", DataType::Text).identifier(),
                FieldProperties::new("title", DataType::Text),
            ])
        }
        fn to_values(&self) -> Vec<DataValue> {
            Vec::new()
        }
        fn from_row(_row: &Row) -> Result<Self, RecordMiddlewareError> {
            Ok(Titled)
        }
    }

    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseInsensitive,
    );
    let err = TableBinder::<String, Titled>::new(BindMode::IgnoreMissingFields)
        .bind(&mut table)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("'title'"), "{message}");
    assert!(matches!(err, RecordMiddlewareError::DataError(_)));
}

#[test]
fn lenient_binding_rejects_ambiguous_resolution() {
    #[derive(Debug)]
    struct DoubleId;
    impl Record for DoubleId {
        fn layout() -> Result<RowLayout, RecordMiddlewareError> {
            RowLayout::new(vec![
                FieldProperties::new("Id", DataType::Int64).identifier(),
                FieldProperties::new("id", DataType::Int64),
            ])
        }
        fn to_values(&self) -> Vec<DataValue> {
            Vec::new()
        }
        fn from_row(_row: &Row) -> Result<Self, RecordMiddlewareError> {
            Ok(DoubleId)
        }
    }

    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseInsensitive,
    );
    let err = TableBinder::<i64, DoubleId>::new(BindMode::IgnoreMissingFields)
        .bind(&mut table)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("both resolved"), "{message}");
}

#[test]
fn strict_binding_requires_field_for_field_match() {
    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseSensitive,
    );
    // Person declares two fields; the backing table has three.
    let err = TableBinder::<i64, Person>::new(BindMode::Strict)
        .bind(&mut table)
        .unwrap_err();
    assert!(matches!(err, RecordMiddlewareError::DataError(_)));
}

#[test]
fn integer_key_on_text_identifier_fails_at_bind_time() {
    let layout = RowLayout::new(vec![
        FieldProperties::new("code", DataType::Text).identifier(),
        FieldProperties::new("label", DataType::Text),
    ])
    .unwrap();
    let mut table = StubBackingTable::new("codes", layout, NameComparison::CaseSensitive);

    let err = TableBinder::<i64, CodeRecord>::new(BindMode::Strict)
        .bind(&mut table)
        .unwrap_err();
    assert!(matches!(err, RecordMiddlewareError::TypeError(_)), "{err}");
}

#[test]
fn text_key_on_integer_identifier_fails_at_bind_time() {
    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseInsensitive,
    );
    let err = TableBinder::<String, Person>::new(BindMode::IgnoreMissingFields)
        .bind(&mut table)
        .unwrap_err();
    assert!(matches!(err, RecordMiddlewareError::TypeError(_)), "{err}");
}

#[test]
fn binding_fixes_the_layout_once() -> Result<(), RecordMiddlewareError> {
    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseInsensitive,
    );
    let binder = TableBinder::<i64, Person>::new(BindMode::IgnoreMissingFields);
    binder.bind(&mut table)?;

    let err = binder.bind(&mut table).unwrap_err();
    assert!(matches!(err, RecordMiddlewareError::LifecycleError(_)), "{err}");
    Ok(())
}

#[test]
fn binding_extracts_keys_and_parameters() -> Result<(), RecordMiddlewareError> {
    let mut table = StubBackingTable::new(
        "people",
        backing_layout(),
        NameComparison::CaseInsensitive,
    );
    let binding =
        TableBinder::<i64, Person>::new(BindMode::IgnoreMissingFields).bind(&mut table)?;

    let person = Person {
        id: 7,
        name: "alice".to_string(),
    };
    assert_eq!(binding.key_of(&person)?, 7);

    let params = binding.to_parameters(&person)?;
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].name, "id");
    assert_eq!(params[0].value, DataValue::Int(7));
    assert_eq!(params[1].value, DataValue::Text("alice".to_string()));

    let layout = Arc::new(binding.layout().clone());
    let row = Row::new(
        layout,
        vec![DataValue::Int(7), DataValue::Text("alice".to_string())],
    );
    assert_eq!(binding.from_row(&row)?, person);
    Ok(())
}
