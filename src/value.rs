//! Typed values and their SQL encodings.
//!
//! Values reach the database in two forms: as positional parameters bound
//! through [`Params`] (the form every generated statement uses), and as
//! quoted SQL literals via [`Value::to_literal`] for rendering statements in
//! diagnostics.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    /// Nested list, only valid inside a payload handed over by the framework.
    List(Vec<Value>),
    /// Nested document, only valid inside a payload handed over by the framework.
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Boolean(_) => "boolean",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Whether the value maps onto a single SQL column.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Fail with `NotImplemented` unless the value is a scalar.
    pub fn ensure_scalar(&self) -> Result<()> {
        if self.is_scalar() {
            Ok(())
        } else {
            Err(self.unsupported())
        }
    }

    fn unsupported(&self) -> StorageError {
        StorageError::not_implemented(format!("unsupported value type: {}", self.type_name()))
    }

    /// Render the value as a SQL literal.
    ///
    /// Text and timestamps are single-quoted with embedded quotes doubled.
    pub fn to_literal(&self) -> Result<String> {
        let literal = match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => real_literal(*f),
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Text(s) => quote(s),
            Value::Timestamp(t) => quote(&format_timestamp(t)),
            Value::Blob(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2 + 3);
                hex.push_str("X'");
                for b in bytes {
                    let _ = write!(hex, "{:02X}", b);
                }
                hex.push('\'');
                hex
            }
            Value::List(_) | Value::Map(_) => return Err(self.unsupported()),
        };
        Ok(literal)
    }

    /// Convert a column value read from SQLite. Blobs holding valid UTF-8 are
    /// normalized to text.
    pub fn from_column(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Value::Text(s.to_string()),
                Err(_) => Value::Blob(bytes.to_vec()),
            },
        }
    }
}

/// Timestamps are stored as RFC 3339 text with microsecond precision so that
/// lexical order matches time order.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn real_literal(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        // keep the literal a REAL
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Timestamp(t) => ToSqlOutput::from(format_timestamp(t)),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
            Value::List(_) | Value::Map(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    format!("unsupported value type: {}", self.type_name()).into(),
                ))
            }
        };
        Ok(out)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Positional parameter bindings collected while building a statement.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: Vec<Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return its placeholder (`?1`, `?2`, ...).
    pub fn bind(&mut self, value: &Value) -> Result<String> {
        self.bind_owned(value.clone())
    }

    pub fn bind_owned(&mut self, value: Value) -> Result<String> {
        value.ensure_scalar()?;
        self.values.push(value);
        Ok(format!("?{}", self.values.len()))
    }

    /// Bind every value and return the comma-separated placeholder list.
    pub fn bind_all(&mut self, values: &[Value]) -> Result<String> {
        let placeholders = values
            .iter()
            .map(|v| self.bind(v))
            .collect::<Result<Vec<_>>>()?;
        Ok(placeholders.join(", "))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
