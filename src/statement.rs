//! SQL statement assembly.
//!
//! Builders only produce [`SqlQuery`] values; nothing here touches a
//! connection.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Result, StorageError};
use crate::item::{Item, CREATED_FIELD, ETAG_FIELD, ID_FIELD, UPDATED_FIELD};
use crate::predicate::translate_predicate;
use crate::query::{Query, SortField};
use crate::value::{Params, Value};

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Render the statement with every placeholder replaced by its literal.
    pub fn to_literal_sql(&self) -> Result<String> {
        let mut out = String::with_capacity(self.statement.len());
        let mut chars = self.statement.char_indices().peekable();
        while let Some((_, c)) = chars.next() {
            if c != '?' {
                out.push(c);
                continue;
            }
            let mut index = 0usize;
            while let Some(&(_, d)) = chars.peek() {
                match d.to_digit(10) {
                    Some(digit) => {
                        index = index * 10 + digit as usize;
                        chars.next();
                    }
                    None => break,
                }
            }
            let value = index
                .checked_sub(1)
                .and_then(|i| self.params.values.get(i))
                .ok_or_else(|| {
                    StorageError::not_implemented(format!("unbound placeholder ?{}", index))
                })?;
            out.push_str(&value.to_literal()?);
        }
        Ok(out)
    }
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_literal_sql() {
            Ok(sql) => f.write_str(&sql),
            Err(_) => f.write_str(&self.statement),
        }
    }
}

/// Validate and double-quote an identifier.
pub fn ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("\"{}\"", name))
    } else {
        Err(StorageError::not_implemented(format!(
            "invalid identifier: {:?}",
            name
        )))
    }
}

/// Builds statements against a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementBuilder {
    table: String,
}

impl StatementBuilder {
    pub fn new(table: &str) -> Result<Self> {
        Ok(Self {
            table: ident(table)?,
        })
    }

    /// `SELECT * FROM t [WHERE p] ORDER BY s [LIMIT n OFFSET m]`
    pub fn select(&self, query: &Query) -> Result<SqlQuery> {
        let mut params = Params::new();
        let mut sql = format!("SELECT * FROM {}", self.table);
        push_where(&mut sql, &translate_predicate(&query.predicate, &mut params)?);
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by(&query.sort)?);
        if let Some(window) = query.window {
            let offset = sql_count(window.offset);
            match window.limit {
                Some(limit) => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", sql_count(limit), offset))
                }
                None if offset > 0 => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                None => {}
            }
        }
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    /// `SELECT COUNT(*) FROM t [WHERE p]`, ignoring sort and window.
    pub fn count(&self, query: &Query) -> Result<SqlQuery> {
        let mut params = Params::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        push_where(&mut sql, &translate_predicate(&query.predicate, &mut params)?);
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    /// `DELETE FROM t WHERE p`. An empty predicate is refused; pass
    /// `Expression::All` to clear the whole table.
    pub fn delete(&self, query: &Query) -> Result<SqlQuery> {
        let mut params = Params::new();
        let predicate = translate_predicate(&query.predicate, &mut params)?;
        if predicate.is_empty() {
            return Err(StorageError::not_implemented(
                "bulk delete without a predicate",
            ));
        }
        let sql = format!("DELETE FROM {} WHERE {}", self.table, predicate);
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    /// Insert one item. `created` and `updated` take `now` whatever the
    /// payload says.
    pub fn insert(&self, item: &Item, now: DateTime<Utc>) -> Result<SqlQuery> {
        let mut params = Params::new();
        let mut columns = vec![
            ident(ID_FIELD)?,
            ident(ETAG_FIELD)?,
            ident(CREATED_FIELD)?,
            ident(UPDATED_FIELD)?,
        ];
        let mut values = vec![
            params.bind(&item.id)?,
            params.bind_owned(Value::Text(item.etag.clone()))?,
            params.bind_owned(Value::Timestamp(now))?,
            params.bind_owned(Value::Timestamp(now))?,
        ];
        for (field, value) in item.writable_fields()? {
            columns.push(ident(field)?);
            values.push(params.bind(value)?);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            values.join(", ")
        );
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    /// Replace `original` with `item`, guarded by the original's id and etag.
    /// `created` is left as stored; `updated` takes `now`.
    pub fn update(&self, item: &Item, original: &Item, now: DateTime<Utc>) -> Result<SqlQuery> {
        let mut params = Params::new();
        let mut sets = vec![
            format!(
                "{} = {}",
                ident(ETAG_FIELD)?,
                params.bind_owned(Value::Text(item.etag.clone()))?
            ),
            format!(
                "{} = {}",
                ident(UPDATED_FIELD)?,
                params.bind_owned(Value::Timestamp(now))?
            ),
        ];
        for (field, value) in item.writable_fields()? {
            sets.push(format!("{} = {}", ident(field)?, params.bind(value)?));
        }
        let guard = self.guard(original, &mut params)?;
        let sql = format!("UPDATE {} SET {} WHERE {}", self.table, sets.join(", "), guard);
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    /// Delete a single item, guarded by its id and etag.
    pub fn delete_item(&self, item: &Item) -> Result<SqlQuery> {
        let mut params = Params::new();
        let guard = self.guard(item, &mut params)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.table, guard);
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    /// Fetch the stored etag of one item.
    pub fn select_etag(&self, id: &Value) -> Result<SqlQuery> {
        let mut params = Params::new();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            ident(ETAG_FIELD)?,
            self.table,
            ident(ID_FIELD)?,
            params.bind(id)?
        );
        Ok(SqlQuery::new(&sql).with_params(params))
    }

    fn guard(&self, item: &Item, params: &mut Params) -> Result<String> {
        Ok(format!(
            "{} = {} AND {} = {}",
            ident(ID_FIELD)?,
            params.bind(&item.id)?,
            ident(ETAG_FIELD)?,
            params.bind_owned(Value::Text(item.etag.clone()))?
        ))
    }
}

// SQLite integers are 64-bit signed; anything larger means "everything".
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn push_where(sql: &mut String, predicate: &str) {
    if !predicate.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
}

fn order_by(sort: &[SortField]) -> Result<String> {
    if sort.is_empty() {
        return ident(ID_FIELD);
    }
    let keys = sort
        .iter()
        .map(|field| {
            let column = ident(&field.name)?;
            Ok(if field.reversed {
                format!("{} DESC", column)
            } else {
                column
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(keys.join(", "))
}
