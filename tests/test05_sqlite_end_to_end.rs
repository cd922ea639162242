#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use common::Person;
use record_middleware::prelude::*;

fn executor_on(dir: &std::path::Path) -> Arc<Executor> {
    let config = EngineConfig {
        kind: EngineKind::Sqlite,
        root: Some(dir.to_path_buf()),
    };
    let pool = Arc::new(ConnectionPool::new(
        config.driver().expect("sqlite driver"),
        PoolConfig::default(),
    ));
    Arc::new(Executor::new(
        pool,
        ExecutorConfig {
            max_error_retries: 3,
            command_timeout: Duration::from_secs(5),
        },
    ))
}

async fn create_people(executor: &Executor) -> Result<(), RecordMiddlewareError> {
    executor
        .execute(
            "app",
            "people",
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score DOUBLE)",
            &[],
        )
        .await?;
    for (name, score) in [("alice", 7.5), ("bob", 3.25)] {
        executor
            .execute(
                "app",
                "people",
                "INSERT INTO people (name, score) VALUES (:name, :score)",
                &[
                    DatabaseParameter::new("name", DataValue::Text(name.to_string())),
                    DatabaseParameter::new("score", DataValue::Float(score)),
                ],
            )
            .await?;
    }
    Ok(())
}

#[tokio::test]
async fn execute_and_query_round_trip() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    create_people(&executor).await?;

    let results = executor
        .query(
            "app",
            "people",
            "SELECT id, name, score FROM people ORDER BY id",
            &[],
            None,
        )
        .await?;
    assert_eq!(results.len(), 2);
    assert_eq!(
        results.rows[0].get("name"),
        Some(&DataValue::Text("alice".to_string()))
    );
    assert_eq!(results.rows[1].get("score"), Some(&DataValue::Float(3.25)));

    let count = executor
        .query_value("app", "people", "SELECT COUNT(*) FROM people", &[])
        .await?;
    assert_eq!(count, DataValue::Int(2));

    let affected = executor
        .execute(
            "app",
            "people",
            "DELETE FROM people WHERE name = :name",
            &[DatabaseParameter::new(
                "name",
                DataValue::Text("bob".to_string()),
            )],
        )
        .await?;
    assert_eq!(affected, 1);
    Ok(())
}

#[tokio::test]
async fn query_value_on_two_rows_reports_additional_data() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    create_people(&executor).await?;

    let err = executor
        .query_value("app", "people", "SELECT name FROM people", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Additional data available"), "{err}");
    Ok(())
}

#[tokio::test]
async fn schema_reports_identifier_and_types() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    create_people(&executor).await?;

    let layout = executor.query_schema("app", "people").await?;
    assert_eq!(layout.len(), 3);

    let id = layout.identifier().expect("identifier field");
    assert_eq!(id.name, "id");
    assert_eq!(id.data_type, DataType::Int64);
    assert!(id.is_auto_increment);

    assert_eq!(layout.fields()[1].data_type, DataType::Text);
    assert_eq!(layout.fields()[2].data_type, DataType::Float);
    Ok(())
}

#[tokio::test]
async fn declared_layout_is_validated_per_query() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    create_people(&executor).await?;

    let good = RowLayout::new(vec![
        FieldProperties::new("id", DataType::Int64)
            .identifier()
            .auto_increment(),
        FieldProperties::new("name", DataType::Text),
        FieldProperties::new("score", DataType::Float),
    ])?;
    let results = executor
        .query(
            "app",
            "people",
            "SELECT id, name, score FROM people ORDER BY id",
            &[],
            Some(&good),
        )
        .await?;
    assert_eq!(results.len(), 2);

    let mismatched = RowLayout::new(vec![
        FieldProperties::new("id", DataType::Int64)
            .identifier()
            .auto_increment(),
        FieldProperties::new("name", DataType::Int64),
        FieldProperties::new("score", DataType::Float),
    ])?;
    let err = executor
        .query(
            "app",
            "people",
            "SELECT id, name, score FROM people",
            &[],
            Some(&mismatched),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RecordMiddlewareError::DataError(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn encoded_timestamps_survive_storage() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    executor
        .execute(
            "app",
            "events",
            "CREATE TABLE events (id INTEGER PRIMARY KEY, at BIGINT)",
            &[],
        )
        .await?;

    let declared = RowLayout::new(vec![
        FieldProperties::new("id", DataType::Int64)
            .identifier()
            .auto_increment(),
        FieldProperties::new("at", DataType::DateTime)
            .with_encoding(DateTimeEncoding::Ticks, DateTimeKind::Unspecified),
    ])?;

    let at = NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(17, 4, 33)
        .unwrap();
    let at_field = &declared.fields()[1];
    let stored = to_database_value(at_field, &DataValue::Timestamp(at))?;
    executor
        .execute(
            "app",
            "events",
            "INSERT INTO events (at) VALUES (:at)",
            &[DatabaseParameter::new("at", stored)],
        )
        .await?;

    // Declared layout drives decoding: the BIGINT comes back as a timestamp.
    let row = executor
        .query_row(
            "app",
            "events",
            "SELECT id, at FROM events",
            &[],
            Some(&declared),
        )
        .await?;
    assert_eq!(row.get("at"), Some(&DataValue::Timestamp(at)));
    Ok(())
}

#[tokio::test]
async fn sql_table_binds_typed_records() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    create_people(&executor).await?;

    let mut table = SqlTable::new(Arc::clone(&executor), "people")
        .with_name_comparison(NameComparison::CaseInsensitive);
    table.connect("app", ConnectOptions::default(), None).await?;

    let binding =
        TableBinder::<i64, Person>::new(BindMode::IgnoreMissingFields).bind(&mut table)?;
    assert_eq!(binding.table_name(), "people");

    let row = executor
        .query_row(
            "app",
            "people",
            "SELECT id, name FROM people WHERE name = :name",
            &[DatabaseParameter::new(
                "name",
                DataValue::Text("alice".to_string()),
            )],
            Some(binding.layout()),
        )
        .await?;
    let person = binding.from_row(&row)?;
    assert_eq!(person.name, "alice");
    assert_eq!(binding.key_of(&person)?, person.id);
    Ok(())
}

#[tokio::test]
async fn pooled_connections_share_the_database_file() -> Result<(), RecordMiddlewareError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = executor_on(dir.path());
    create_people(&executor).await?;

    // Drain the idle set so the next call must open a second connection.
    let pool = executor.pool();
    let first = pool.get_connection("app").await?;
    let count = executor
        .query_value("app", "people", "SELECT COUNT(*) FROM people", &[])
        .await?;
    assert_eq!(count, DataValue::Int(2));
    pool.return_connection(first, false).await;
    pool.close().await;
    Ok(())
}
