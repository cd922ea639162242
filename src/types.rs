use chrono::{Duration, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be stored in a record field or bound as statement
/// parameters.
///
/// One enum shared across backing engines so application code never branches
/// on driver types:
/// ```rust
/// use record_middleware::prelude::*;
///
/// let params = vec![
///     DatabaseParameter::new("id", DataValue::Int(1)),
///     DatabaseParameter::new("name", DataValue::Text("alice".into())),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Exact decimal value, canonical string form
    Decimal(String),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Date-time value (no timezone attached; see `DateTimeKind`)
    Timestamp(NaiveDateTime),
    /// Elapsed-time value
    Interval(Duration),
    /// JSON value (user-defined field types marshal through here)
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

impl DataValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let DataValue::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let DataValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let DataValue::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let DataValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f") {
                return Some(dt);
            }
            // Any other fractional width
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_interval(&self) -> Option<Duration> {
        if let DataValue::Interval(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let DataValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let DataValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let DataValue::Json(value) = self {
            Some(value)
        } else {
            None
        }
    }
}

/// Closed set of declared field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int16,
    Int32,
    Int64,
    Float,
    Decimal,
    Text,
    Binary,
    Bool,
    /// Enumeration; marshalled as a 64-bit integer
    Enum,
    /// User-defined type; marshalled through its string form
    UserDefined,
    DateTime,
    TimeSpan,
}

/// How a `DateTime` or `TimeSpan` field is encoded in the backing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DateTimeEncoding {
    /// Engine-native date-time pass-through
    #[default]
    Native,
    /// 100-nanosecond ticks since 0001-01-01, as a big integer
    Ticks,
    /// Human-readable big integer, `YYYYMMDDHHMMSS`
    HumanReadableTicks,
    /// Seconds since the Unix epoch as an exact decimal
    DecimalSeconds,
    /// Seconds since the Unix epoch as a double
    DoubleSeconds,
}

/// Timezone treatment for a `DateTime` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DateTimeKind {
    #[default]
    Unspecified,
    Local,
    Utc,
}

/// The backing-engine families this middleware ships adapters for
#[derive(Debug, Clone, PartialEq, Eq, Hash, ValueEnum)]
pub enum EngineKind {
    /// Embedded `SQLite` engine
    #[cfg(feature = "sqlite")]
    Sqlite,
    /// In-process memory table
    Memory,
}

/// A name/value pair bound into a parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseParameter {
    /// Parameter name, without any engine-specific prefix
    pub name: String,
    /// The value to bind
    pub value: DataValue,
}

impl DatabaseParameter {
    pub fn new(name: impl Into<String>, value: DataValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
