use rusqlite::types::Value;

use crate::codec;
use crate::error::RecordMiddlewareError;
use crate::types::{DataValue, DatabaseParameter};

/// Parameters converted for `rusqlite`, either named (`:name`) or
/// positional in declaration order.
pub(crate) enum Bound {
    Named(Vec<(String, Value)>),
    Positional(Vec<Value>),
}

pub(crate) fn convert(parameters: &[DatabaseParameter]) -> Result<Bound, RecordMiddlewareError> {
    if parameters.iter().all(|p| !p.name.is_empty()) {
        let mut pairs = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            pairs.push((format!(":{}", parameter.name), to_sql_value(&parameter.value)?));
        }
        Ok(Bound::Named(pairs))
    } else {
        let mut values = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            values.push(to_sql_value(&parameter.value)?);
        }
        Ok(Bound::Positional(values))
    }
}

pub(crate) fn to_sql_value(value: &DataValue) -> Result<Value, RecordMiddlewareError> {
    Ok(match value {
        DataValue::Int(i) => Value::Integer(*i),
        DataValue::Float(f) => Value::Real(*f),
        DataValue::Decimal(s) | DataValue::Text(s) => Value::Text(s.clone()),
        DataValue::Bool(b) => Value::Integer(i64::from(*b)),
        DataValue::Timestamp(dt) => {
            Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        DataValue::Interval(d) => {
            Value::Text(codec::micros_to_decimal(codec::interval_micros(*d)?))
        }
        DataValue::Json(v) => Value::Text(v.to_string()),
        DataValue::Blob(b) => Value::Blob(b.clone()),
        DataValue::Null => Value::Null,
    })
}

pub(crate) fn from_value_ref(value: rusqlite::types::ValueRef<'_>) -> DataValue {
    match value {
        rusqlite::types::ValueRef::Null => DataValue::Null,
        rusqlite::types::ValueRef::Integer(i) => DataValue::Int(i),
        rusqlite::types::ValueRef::Real(f) => DataValue::Float(f),
        rusqlite::types::ValueRef::Text(t) => {
            DataValue::Text(String::from_utf8_lossy(t).into_owned())
        }
        rusqlite::types::ValueRef::Blob(b) => DataValue::Blob(b.to_vec()),
    }
}
