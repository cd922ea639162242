//! Bidirectional value marshalling between local typed values and
//! engine-native encodings.
//!
//! Date-time fields support several storage encodings selected per field by
//! `DateTimeEncoding`; the zero-value date-time sentinel maps to NULL on the
//! way in and NULL date-times map back to tick-zero on the way out.

use chrono::{Duration, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::RecordMiddlewareError;
use crate::schema::FieldProperties;
use crate::types::{DataType, DataValue, DateTimeEncoding, DateTimeKind};

/// Tick zero: 0001-01-01T00:00:00. Also the zero-value sentinel that
/// marshals to NULL.
#[must_use]
pub fn zero_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

fn unix_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

fn data_err(msg: impl Into<String>) -> RecordMiddlewareError {
    RecordMiddlewareError::DataError(msg.into())
}

fn type_err(field: &FieldProperties, value: &DataValue) -> RecordMiddlewareError {
    RecordMiddlewareError::TypeError(format!(
        "field '{}' ({:?}) cannot marshal value {value:?}",
        field.name, field.data_type
    ))
}

fn datetime_to_ticks(dt: NaiveDateTime) -> Result<i64, RecordMiddlewareError> {
    let micros = dt
        .signed_duration_since(zero_datetime())
        .num_microseconds()
        .ok_or_else(|| data_err(format!("date-time '{dt}' is out of tick range")))?;
    micros
        .checked_mul(10)
        .ok_or_else(|| data_err(format!("date-time '{dt}' is out of tick range")))
}

fn ticks_to_datetime(ticks: i64) -> Result<NaiveDateTime, RecordMiddlewareError> {
    zero_datetime()
        .checked_add_signed(Duration::microseconds(ticks / 10))
        .ok_or_else(|| data_err(format!("tick value {ticks} is out of date-time range")))
}

fn datetime_to_human(dt: NaiveDateTime) -> Result<i64, RecordMiddlewareError> {
    dt.format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .map_err(|e| data_err(format!("cannot render '{dt}' as a numeric timestamp: {e}")))
}

fn human_to_datetime(value: i64) -> Result<NaiveDateTime, RecordMiddlewareError> {
    let text = format!("{value:014}");
    NaiveDateTime::parse_from_str(&text, "%Y%m%d%H%M%S")
        .map_err(|e| data_err(format!("cannot parse numeric timestamp '{value}': {e}")))
}

fn datetime_to_unix_micros(dt: NaiveDateTime) -> Result<i64, RecordMiddlewareError> {
    dt.signed_duration_since(unix_epoch())
        .num_microseconds()
        .ok_or_else(|| data_err(format!("date-time '{dt}' is out of epoch-seconds range")))
}

fn unix_micros_to_datetime(micros: i64) -> Result<NaiveDateTime, RecordMiddlewareError> {
    unix_epoch()
        .checked_add_signed(Duration::microseconds(micros))
        .ok_or_else(|| data_err(format!("epoch value {micros} is out of date-time range")))
}

pub(crate) fn micros_to_decimal(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let frac = micros.rem_euclid(1_000_000);
    format!("{secs}.{frac:06}")
}

fn decimal_to_micros(text: &str) -> Result<i64, RecordMiddlewareError> {
    let (sec_part, frac_part) = match text.split_once('.') {
        Some((s, f)) => (s, f),
        None => (text, ""),
    };
    let secs: i64 = sec_part
        .trim()
        .parse()
        .map_err(|e| data_err(format!("cannot parse decimal seconds '{text}': {e}")))?;
    let padded = format!("{frac_part:0<6}");
    let frac: i64 = padded
        .get(..6)
        .unwrap_or("0")
        .parse()
        .map_err(|e| data_err(format!("cannot parse decimal seconds '{text}': {e}")))?;
    // "-0.5" parses its integer part to 0; keep the sign from the text.
    if secs == 0 && sec_part.trim().starts_with('-') {
        Ok(-frac)
    } else {
        secs.checked_mul(1_000_000)
            .and_then(|s| s.checked_add(frac))
            .ok_or_else(|| data_err(format!("decimal seconds '{text}' out of range")))
    }
}

/// Normalize a wall-clock value into the form the field stores. Fields with
/// `DateTimeKind::Utc` store UTC and receive local time.
fn kind_for_storage(kind: DateTimeKind, dt: NaiveDateTime) -> NaiveDateTime {
    match kind {
        DateTimeKind::Utc => match Local.from_local_datetime(&dt) {
            LocalResult::Single(l) => l.naive_utc(),
            LocalResult::Ambiguous(earliest, _) => earliest.naive_utc(),
            LocalResult::None => dt,
        },
        DateTimeKind::Local | DateTimeKind::Unspecified => dt,
    }
}

/// Inverse of `kind_for_storage`: stored UTC comes back as local wall clock.
fn kind_for_load(kind: DateTimeKind, dt: NaiveDateTime) -> NaiveDateTime {
    match kind {
        DateTimeKind::Utc => Utc.from_utc_datetime(&dt).with_timezone(&Local).naive_local(),
        DateTimeKind::Local | DateTimeKind::Unspecified => dt,
    }
}

fn int_in_range(
    field: &FieldProperties,
    value: i64,
    min: i64,
    max: i64,
) -> Result<DataValue, RecordMiddlewareError> {
    if value < min || value > max {
        return Err(data_err(format!(
            "field '{}' value {value} is outside {min}..={max}",
            field.name
        )));
    }
    Ok(DataValue::Int(value))
}

pub(crate) fn interval_micros(duration: Duration) -> Result<i64, RecordMiddlewareError> {
    duration
        .num_microseconds()
        .ok_or_else(|| data_err("time-span is out of range".to_string()))
}

/// Convert one local typed value into the field's engine-native encoding.
///
/// # Errors
///
/// Returns a type fault when the value's shape does not match the field,
/// and a data fault when the value falls outside the encoding's range.
pub fn to_database_value(
    field: &FieldProperties,
    value: &DataValue,
) -> Result<DataValue, RecordMiddlewareError> {
    if value.is_null() {
        return Ok(DataValue::Null);
    }
    match field.data_type {
        DataType::Int16 => match value {
            DataValue::Int(i) => int_in_range(field, *i, i64::from(i16::MIN), i64::from(i16::MAX)),
            _ => Err(type_err(field, value)),
        },
        DataType::Int32 => match value {
            DataValue::Int(i) => int_in_range(field, *i, i64::from(i32::MIN), i64::from(i32::MAX)),
            _ => Err(type_err(field, value)),
        },
        DataType::Int64 | DataType::Enum => match value {
            DataValue::Int(i) => Ok(DataValue::Int(*i)),
            _ => Err(type_err(field, value)),
        },
        DataType::Float => match value {
            DataValue::Float(f) => Ok(DataValue::Float(*f)),
            DataValue::Int(i) => Ok(DataValue::Float(*i as f64)),
            _ => Err(type_err(field, value)),
        },
        DataType::Decimal => match value {
            DataValue::Decimal(text) => {
                text.parse::<f64>().map_err(|e| {
                    RecordMiddlewareError::ParameterError(format!(
                        "field '{}' decimal '{text}' is not numeric: {e}",
                        field.name
                    ))
                })?;
                Ok(DataValue::Decimal(text.clone()))
            }
            DataValue::Int(i) => Ok(DataValue::Decimal(i.to_string())),
            DataValue::Float(f) => Ok(DataValue::Decimal(f.to_string())),
            _ => Err(type_err(field, value)),
        },
        DataType::Text => match value {
            DataValue::Text(s) => Ok(DataValue::Text(s.clone())),
            _ => Err(type_err(field, value)),
        },
        DataType::Binary => match value {
            DataValue::Blob(b) => Ok(DataValue::Blob(b.clone())),
            _ => Err(type_err(field, value)),
        },
        DataType::Bool => match value {
            DataValue::Bool(b) => Ok(DataValue::Bool(*b)),
            DataValue::Int(0) => Ok(DataValue::Bool(false)),
            DataValue::Int(1) => Ok(DataValue::Bool(true)),
            _ => Err(type_err(field, value)),
        },
        DataType::UserDefined => match value {
            DataValue::Json(v) => Ok(DataValue::Text(v.to_string())),
            DataValue::Text(s) => Ok(DataValue::Text(s.clone())),
            _ => Err(type_err(field, value)),
        },
        DataType::DateTime => match value {
            DataValue::Timestamp(dt) => {
                if *dt == zero_datetime() {
                    // zero-value sentinel: stored as the engine's null marker
                    return Ok(DataValue::Null);
                }
                let dt = kind_for_storage(field.date_time_kind, *dt);
                match field.date_time_encoding {
                    DateTimeEncoding::Native => Ok(DataValue::Timestamp(dt)),
                    DateTimeEncoding::Ticks => datetime_to_ticks(dt).map(DataValue::Int),
                    DateTimeEncoding::HumanReadableTicks => {
                        datetime_to_human(dt).map(DataValue::Int)
                    }
                    DateTimeEncoding::DecimalSeconds => Ok(DataValue::Decimal(micros_to_decimal(
                        datetime_to_unix_micros(dt)?,
                    ))),
                    DateTimeEncoding::DoubleSeconds => {
                        Ok(DataValue::Float(datetime_to_unix_micros(dt)? as f64 / 1e6))
                    }
                }
            }
            _ => Err(type_err(field, value)),
        },
        DataType::TimeSpan => match value {
            DataValue::Interval(duration) => match field.date_time_encoding {
                DateTimeEncoding::Native => Ok(DataValue::Interval(*duration)),
                DateTimeEncoding::Ticks | DateTimeEncoding::HumanReadableTicks => {
                    interval_micros(*duration)?
                        .checked_mul(10)
                        .map(DataValue::Int)
                        .ok_or_else(|| data_err("time-span is out of tick range".to_string()))
                }
                DateTimeEncoding::DecimalSeconds => Ok(DataValue::Decimal(micros_to_decimal(
                    interval_micros(*duration)?,
                ))),
                DateTimeEncoding::DoubleSeconds => {
                    Ok(DataValue::Float(interval_micros(*duration)? as f64 / 1e6))
                }
            },
            _ => Err(type_err(field, value)),
        },
    }
}

/// Convert one engine-native value back into the local typed form.
///
/// NULL date-time and time-span values default to tick-zero; other NULLs
/// stay NULL. Unparseable date-time representations surface as data faults
/// wrapping the underlying parse failure.
///
/// # Errors
///
/// Returns a data fault for unparseable representations and a type fault
/// when the engine value's shape does not match the field.
pub fn to_local_value(
    field: &FieldProperties,
    value: &DataValue,
) -> Result<DataValue, RecordMiddlewareError> {
    match field.data_type {
        DataType::DateTime => {
            if value.is_null() {
                return Ok(DataValue::Timestamp(zero_datetime()));
            }
            let stored = match field.date_time_encoding {
                DateTimeEncoding::Native => match value {
                    DataValue::Timestamp(dt) => *dt,
                    DataValue::Text(s) => value
                        .as_timestamp()
                        .ok_or_else(|| data_err(format!("cannot parse date-time '{s}'")))?,
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::Ticks => match value {
                    DataValue::Int(t) => ticks_to_datetime(*t)?,
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::HumanReadableTicks => match value {
                    DataValue::Int(v) => human_to_datetime(*v)?,
                    DataValue::Text(s) => {
                        let v: i64 = s.parse().map_err(|e| {
                            data_err(format!("cannot parse numeric timestamp '{s}': {e}"))
                        })?;
                        human_to_datetime(v)?
                    }
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::DecimalSeconds => match value {
                    DataValue::Decimal(s) | DataValue::Text(s) => {
                        unix_micros_to_datetime(decimal_to_micros(s)?)?
                    }
                    DataValue::Int(secs) => unix_micros_to_datetime(
                        secs.checked_mul(1_000_000)
                            .ok_or_else(|| data_err("epoch seconds out of range".to_string()))?,
                    )?,
                    DataValue::Float(f) => unix_micros_to_datetime((f * 1e6).round() as i64)?,
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::DoubleSeconds => match value {
                    DataValue::Float(f) => unix_micros_to_datetime((f * 1e6).round() as i64)?,
                    DataValue::Int(secs) => unix_micros_to_datetime(
                        secs.checked_mul(1_000_000)
                            .ok_or_else(|| data_err("epoch seconds out of range".to_string()))?,
                    )?,
                    _ => return Err(type_err(field, value)),
                },
            };
            Ok(DataValue::Timestamp(kind_for_load(field.date_time_kind, stored)))
        }
        DataType::TimeSpan => {
            if value.is_null() {
                return Ok(DataValue::Interval(Duration::zero()));
            }
            let duration = match field.date_time_encoding {
                DateTimeEncoding::Native => match value {
                    DataValue::Interval(d) => *d,
                    // engines without a native interval type hand back the
                    // decimal-seconds text form
                    DataValue::Decimal(s) | DataValue::Text(s) => {
                        Duration::microseconds(decimal_to_micros(s)?)
                    }
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::Ticks | DateTimeEncoding::HumanReadableTicks => match value {
                    DataValue::Int(ticks) => Duration::microseconds(ticks / 10),
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::DecimalSeconds => match value {
                    DataValue::Decimal(s) | DataValue::Text(s) => {
                        Duration::microseconds(decimal_to_micros(s)?)
                    }
                    _ => return Err(type_err(field, value)),
                },
                DateTimeEncoding::DoubleSeconds => match value {
                    DataValue::Float(f) => Duration::microseconds((f * 1e6).round() as i64),
                    _ => return Err(type_err(field, value)),
                },
            };
            Ok(DataValue::Interval(duration))
        }
        _ if value.is_null() => Ok(DataValue::Null),
        DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::Enum => match value {
            DataValue::Int(i) => Ok(DataValue::Int(*i)),
            _ => Err(type_err(field, value)),
        },
        DataType::Float => match value {
            DataValue::Float(f) => Ok(DataValue::Float(*f)),
            DataValue::Int(i) => Ok(DataValue::Float(*i as f64)),
            _ => Err(type_err(field, value)),
        },
        DataType::Decimal => match value {
            DataValue::Decimal(s) => Ok(DataValue::Decimal(s.clone())),
            DataValue::Text(s) => Ok(DataValue::Decimal(s.clone())),
            DataValue::Int(i) => Ok(DataValue::Decimal(i.to_string())),
            DataValue::Float(f) => Ok(DataValue::Decimal(f.to_string())),
            _ => Err(type_err(field, value)),
        },
        DataType::Text => match value {
            DataValue::Text(s) => Ok(DataValue::Text(s.clone())),
            _ => Err(type_err(field, value)),
        },
        DataType::Binary => match value {
            DataValue::Blob(b) => Ok(DataValue::Blob(b.clone())),
            _ => Err(type_err(field, value)),
        },
        DataType::Bool => match value {
            DataValue::Bool(b) => Ok(DataValue::Bool(*b)),
            DataValue::Int(0) => Ok(DataValue::Bool(false)),
            DataValue::Int(1) => Ok(DataValue::Bool(true)),
            _ => Err(type_err(field, value)),
        },
        DataType::UserDefined => match value {
            DataValue::Json(v) => Ok(DataValue::Json(v.clone())),
            DataValue::Text(s) => serde_json::from_str(s)
                .map(DataValue::Json)
                .map_err(|e| data_err(format!("cannot parse user-defined value '{s}': {e}"))),
            _ => Err(type_err(field, value)),
        },
    }
}

/// Escape a string for inclusion in a single-quoted SQL literal.
///
/// Used only when parameter binding is unavailable.
#[must_use]
pub fn escape_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\u{8}' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Render a field value as an engine-agnostic SQL literal.
///
/// # Errors
///
/// Propagates marshalling failures from [`to_database_value`].
pub fn escape_field_value(
    field: &FieldProperties,
    value: &DataValue,
) -> Result<String, RecordMiddlewareError> {
    let db_value = to_database_value(field, value)?;
    Ok(render_literal(&db_value))
}

fn render_literal(value: &DataValue) -> String {
    match value {
        DataValue::Null => "NULL".to_string(),
        DataValue::Int(i) => i.to_string(),
        DataValue::Float(f) => f.to_string(),
        DataValue::Decimal(d) => d.clone(),
        DataValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        DataValue::Text(s) => format!("'{}'", escape_string(s)),
        DataValue::Json(v) => format!("'{}'", escape_string(&v.to_string())),
        DataValue::Timestamp(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.6f")),
        DataValue::Interval(d) => d
            .num_microseconds()
            .map_or_else(|| "NULL".to_string(), |m| micros_to_decimal(m)),
        DataValue::Blob(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            out.push_str("X'");
            for b in bytes {
                out.push_str(&format!("{b:02X}"));
            }
            out.push('\'');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldProperties;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn datetime_field(encoding: DateTimeEncoding) -> FieldProperties {
        FieldProperties::new("ts", DataType::DateTime)
            .with_encoding(encoding, DateTimeKind::Unspecified)
    }

    #[test]
    fn datetime_round_trips_every_encoding() {
        let original = DataValue::Timestamp(dt(2024, 3, 9, 17, 4, 33));
        for encoding in [
            DateTimeEncoding::Native,
            DateTimeEncoding::Ticks,
            DateTimeEncoding::HumanReadableTicks,
            DateTimeEncoding::DecimalSeconds,
            DateTimeEncoding::DoubleSeconds,
        ] {
            let field = datetime_field(encoding);
            let stored = to_database_value(&field, &original).unwrap();
            let loaded = to_local_value(&field, &stored).unwrap();
            assert_eq!(loaded, original, "encoding {encoding:?}");
        }
    }

    #[test]
    fn timespan_round_trips_every_encoding() {
        let original = DataValue::Interval(Duration::seconds(90) + Duration::microseconds(250));
        for encoding in [
            DateTimeEncoding::Native,
            DateTimeEncoding::Ticks,
            DateTimeEncoding::DecimalSeconds,
            DateTimeEncoding::DoubleSeconds,
        ] {
            let field = FieldProperties::new("span", DataType::TimeSpan)
                .with_encoding(encoding, DateTimeKind::Unspecified);
            let stored = to_database_value(&field, &original).unwrap();
            let loaded = to_local_value(&field, &stored).unwrap();
            assert_eq!(loaded, original, "encoding {encoding:?}");
        }
    }

    #[test]
    fn zero_datetime_stores_as_null_and_loads_back() {
        let field = datetime_field(DateTimeEncoding::Ticks);
        let stored =
            to_database_value(&field, &DataValue::Timestamp(zero_datetime())).unwrap();
        assert_eq!(stored, DataValue::Null);
        let loaded = to_local_value(&field, &DataValue::Null).unwrap();
        assert_eq!(loaded, DataValue::Timestamp(zero_datetime()));
    }

    #[test]
    fn null_timespan_defaults_to_zero() {
        let field = FieldProperties::new("span", DataType::TimeSpan);
        let loaded = to_local_value(&field, &DataValue::Null).unwrap();
        assert_eq!(loaded, DataValue::Interval(Duration::zero()));
    }

    #[test]
    fn unparseable_timestamp_surfaces_data_error() {
        let field = datetime_field(DateTimeEncoding::HumanReadableTicks);
        let err = to_local_value(&field, &DataValue::Text("not-a-date".into())).unwrap_err();
        assert!(matches!(err, RecordMiddlewareError::DataError(_)));
        assert!(err.to_string().contains("not-a-date"));
    }

    #[test]
    fn enum_marshals_as_integer() {
        let field = FieldProperties::new("state", DataType::Enum);
        let stored = to_database_value(&field, &DataValue::Int(3)).unwrap();
        assert_eq!(stored, DataValue::Int(3));
        assert!(to_database_value(&field, &DataValue::Text("three".into())).is_err());
    }

    #[test]
    fn user_defined_round_trips_through_string_form() {
        let field = FieldProperties::new("extra", DataType::UserDefined);
        let original = DataValue::Json(serde_json::json!({"a": 1, "b": [true, null]}));
        let stored = to_database_value(&field, &original).unwrap();
        assert!(matches!(stored, DataValue::Text(_)));
        let loaded = to_local_value(&field, &stored).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn small_int_out_of_range_is_a_data_error() {
        let field = FieldProperties::new("n", DataType::Int16);
        let err = to_database_value(&field, &DataValue::Int(70_000)).unwrap_err();
        assert!(matches!(err, RecordMiddlewareError::DataError(_)));
    }

    #[test]
    fn escape_string_covers_control_characters() {
        let escaped = escape_string("a\\b\0c'd\"e\u{8}f\ng\rh\ti");
        assert_eq!(escaped, "a\\\\b\\0c\\'d\\\"e\\bf\\ng\\rh\\ti");
    }

    #[test]
    fn literals_render_engine_agnostic() {
        let text = FieldProperties::new("t", DataType::Text);
        assert_eq!(
            escape_field_value(&text, &DataValue::Text("o'brien".into())).unwrap(),
            "'o\\'brien'"
        );
        let flag = FieldProperties::new("b", DataType::Bool);
        assert_eq!(
            escape_field_value(&flag, &DataValue::Bool(true)).unwrap(),
            "1"
        );
        let blob = FieldProperties::new("raw", DataType::Binary);
        assert_eq!(
            escape_field_value(&blob, &DataValue::Blob(vec![0xAB, 0x01])).unwrap(),
            "X'AB01'"
        );
        let num = FieldProperties::new("n", DataType::Int64);
        assert_eq!(
            escape_field_value(&num, &DataValue::Null).unwrap(),
            "NULL"
        );
    }

    #[test]
    fn decimal_seconds_handles_negative_values() {
        let micros = -1_500_000;
        let text = micros_to_decimal(micros);
        assert_eq!(decimal_to_micros(&text).unwrap(), micros);
        assert_eq!(decimal_to_micros("-0.500000").unwrap(), -500_000);
    }
}
