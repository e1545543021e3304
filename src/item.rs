//! Generic resource items and their mapping to and from table rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::value::Value;

pub const ID_FIELD: &str = "id";
pub const ETAG_FIELD: &str = "etag";
pub const CREATED_FIELD: &str = "created";
pub const UPDATED_FIELD: &str = "updated";

/// Columns managed by the handler rather than taken from the payload.
const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, ETAG_FIELD, CREATED_FIELD, UPDATED_FIELD];

/// A stored resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Value,
    pub etag: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub payload: BTreeMap<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<Value>, etag: &str, payload: BTreeMap<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            etag: etag.to_string(),
            created: now,
            updated: now,
            payload,
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Payload fields written as columns, in key order. Reserved columns are
    /// skipped; the statement builder writes those itself.
    ///
    /// SQLite column names are case-insensitive, so reserved names are matched
    /// ignoring ASCII case and two keys naming the same column are refused.
    pub fn writable_fields(&self) -> Result<Vec<(&str, &Value)>> {
        let mut fields: Vec<(&str, &Value)> = Vec::with_capacity(self.payload.len());
        for (key, value) in &self.payload {
            if is_reserved(key) {
                continue;
            }
            if fields.iter().any(|(seen, _)| seen.eq_ignore_ascii_case(key)) {
                return Err(StorageError::not_implemented(format!(
                    "payload fields naming the same column as {:?}",
                    key
                )));
            }
            fields.push((key.as_str(), value));
        }
        Ok(fields)
    }

    /// Build an item from a row read as column name → value.
    ///
    /// `etag` and `updated` are lifted out of the payload; `id` and `created`
    /// stay in it, as the framework exposes them as regular fields.
    pub fn from_columns(mut columns: BTreeMap<String, Value>) -> Result<Self> {
        let id = columns
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| StorageError::Mapping("missing id column".to_string()))?;
        let etag = match columns.remove(ETAG_FIELD) {
            Some(Value::Text(etag)) => etag,
            Some(Value::Null) | None => {
                return Err(StorageError::Mapping("missing etag column".to_string()))
            }
            Some(other) => {
                return Err(StorageError::Mapping(format!(
                    "etag column holds {}",
                    other.type_name()
                )))
            }
        };
        let updated = match columns.remove(UPDATED_FIELD) {
            Some(v) => parse_timestamp(UPDATED_FIELD, &v)?,
            None => None,
        };
        let created = match columns.get(CREATED_FIELD) {
            Some(v) => parse_timestamp(CREATED_FIELD, v)?,
            None => None,
        };
        let updated = updated
            .or(created)
            .ok_or_else(|| StorageError::Mapping("missing updated column".to_string()))?;
        Ok(Self {
            id,
            etag,
            created: created.unwrap_or(updated),
            updated,
            payload: columns,
        })
    }

    /// Read the current row of a result set.
    pub fn from_row(names: &[String], row: &Row<'_>) -> Result<Self> {
        let mut columns = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            columns.insert(name.clone(), Value::from_column(row.get_ref(i)?));
        }
        Self::from_columns(columns)
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Stored timestamps are RFC 3339 text; integers are read as unix seconds.
fn parse_timestamp(column: &str, value: &Value) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::Timestamp(t) => Ok(Some(*t)),
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| StorageError::Mapping(format!("{} column: {}", column, e))),
        Value::Integer(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)
            .map(Some)
            .ok_or_else(|| StorageError::Mapping(format!("{} column out of range", column))),
        other => Err(StorageError::Mapping(format!(
            "{} column holds {}",
            column,
            other.type_name()
        ))),
    }
}

/// A page of items returned by a find.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
    /// Number of items matching the predicate, ignoring the window.
    pub total: usize,
    pub offset: usize,
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_updated_is_parsed_from_row() {
        let item = Item::from_columns(row(&[
            ("id", Value::from("u1")),
            ("etag", Value::from("e1")),
            ("created", Value::from("2020-01-01T00:00:00.000000Z")),
            ("updated", Value::from("2021-06-15T08:30:00.250000Z")),
            ("name", Value::from("alice")),
        ]))
        .unwrap();

        assert_eq!(item.id, Value::from("u1"));
        assert_eq!(item.etag, "e1");
        assert_eq!(
            item.updated,
            Utc.with_ymd_and_hms(2021, 6, 15, 8, 30, 0).unwrap()
                + chrono::Duration::milliseconds(250)
        );
        assert_eq!(item.created, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(!item.payload.contains_key("etag"));
        assert!(!item.payload.contains_key("updated"));
        assert_eq!(item.get("id"), Some(&Value::from("u1")));
        assert_eq!(item.get("name"), Some(&Value::from("alice")));
    }

    #[test]
    fn test_integer_timestamps() {
        let item = Item::from_columns(row(&[
            ("id", Value::Integer(1)),
            ("etag", Value::from("e")),
            ("updated", Value::Integer(86_400)),
        ]))
        .unwrap();
        assert_eq!(item.updated, Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(item.created, item.updated);
    }

    #[test]
    fn test_malformed_rows() {
        assert!(matches!(
            Item::from_columns(row(&[("etag", Value::from("e"))])),
            Err(StorageError::Mapping(_))
        ));
        assert!(matches!(
            Item::from_columns(row(&[
                ("id", Value::Integer(1)),
                ("updated", Value::from("yesterday")),
            ])),
            Err(StorageError::Mapping(_))
        ));
        assert!(matches!(
            Item::from_columns(row(&[("id", Value::Integer(1)), ("updated", Value::Null)])),
            Err(StorageError::Mapping(_))
        ));
    }

    #[test]
    fn test_writable_fields_skip_reserved() {
        let item = Item::new(1, "e", BTreeMap::new())
            .with_field("id", 2)
            .with_field("etag", "x")
            .with_field("created", "x")
            .with_field("updated", "x")
            .with_field("title", "hello")
            .with_field("body", "world");
        let fields: Vec<_> = item
            .writable_fields()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(fields, vec!["body", "title"]);
    }

    #[test]
    fn test_reserved_fields_ignore_case() {
        let item = Item::new(1, "e", BTreeMap::new())
            .with_field("ID", 2)
            .with_field("ETag", "forged")
            .with_field("Created", "x")
            .with_field("UPDATED", "x")
            .with_field("title", "hello");
        let fields: Vec<_> = item
            .writable_fields()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(fields, vec!["title"]);
    }

    #[test]
    fn test_fields_naming_one_column_are_refused() {
        let item = Item::new(1, "e", BTreeMap::new())
            .with_field("Title", "a")
            .with_field("title", "b");
        assert!(matches!(
            item.writable_fields(),
            Err(StorageError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_missing_etag_is_mapping_error() {
        for etag in [None, Some(Value::Null)] {
            let mut columns = row(&[
                ("id", Value::Integer(1)),
                ("updated", Value::from("2021-06-15T08:30:00.000000Z")),
            ]);
            if let Some(etag) = etag {
                columns.insert("etag".to_string(), etag);
            }
            assert!(matches!(
                Item::from_columns(columns),
                Err(StorageError::Mapping(_))
            ));
        }
    }
}
