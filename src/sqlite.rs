use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::SqliteConfig;
use crate::context::Context;
use crate::error::{ErrorKind, Result, StorageError};
use crate::item::{Item, ItemList};
use crate::query::Query;
use crate::statement::{SqlQuery, StatementBuilder};

/// Storage operations the resource framework calls on a table handler.
pub trait Storer: Send + Sync {
    /// Return the items matching `query`, reading the whole result set.
    fn find(&self, ctx: &Context, query: &Query) -> Result<ItemList>;

    /// Insert all items or none. An identifier collision is a `Conflict`.
    fn insert(&self, ctx: &Context, items: &[Item]) -> Result<()>;

    /// Replace `original` with `item` if the stored etag still matches
    /// `original.etag`.
    fn update(&self, ctx: &Context, item: &Item, original: &Item) -> Result<()>;

    /// Remove `item` if the stored etag still matches `item.etag`.
    fn delete(&self, ctx: &Context, item: &Item) -> Result<()>;

    /// Remove every item matching `query` and return how many were removed.
    fn clear(&self, ctx: &Context, query: &Query) -> Result<usize>;
}

/// Shared SQLite handle. Clones use the same connection.
#[derive(Debug, Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
    progress_ops: i32,
}

impl Database {
    /// Open the database described by `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        info!(path = %config.db_path, "opening sqlite database");
        let connection = Connection::open(&config.db_path)?;
        Self::from_connection(connection, config)
    }

    /// Adopt an existing connection, applying `config`'s settings to it.
    /// Tables are expected to exist already.
    pub fn from_connection(connection: Connection, config: &SqliteConfig) -> Result<Self> {
        connection.busy_timeout(config.busy_timeout())?;
        let mode: String = connection.pragma_update_and_check(
            None,
            "journal_mode",
            config.journal_mode.pragma_value(),
            |row| row.get(0),
        )?;
        connection.pragma_update(None, "case_sensitive_like", config.case_sensitive_like)?;
        debug!(journal_mode = %mode, "sqlite connection configured");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            progress_ops: config.progress_ops.max(1),
        })
    }

    /// A handler for `table` sharing this database.
    pub fn handler(&self, table: &str) -> Result<Handler> {
        Handler::new(self.clone(), table)
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| StorageError::LockPoisoned(operation))
    }

    /// Run `f` with exclusive use of the connection. While it runs, SQLite
    /// polls `ctx` and interrupts the current statement once it is done.
    fn run<T>(
        &self,
        ctx: &Context,
        operation: &'static str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        ctx.check()?;
        let mut conn = self.lock(operation)?;
        let watch = ctx.clone();
        conn.progress_handler(self.progress_ops, Some(move || watch.is_done()));
        let result = f(&mut *conn);
        conn.progress_handler(0, None::<fn() -> bool>);
        result
    }
}

/// Storage handler for one table.
#[derive(Debug, Clone)]
pub struct Handler {
    db: Database,
    table: String,
    statements: StatementBuilder,
}

impl Handler {
    pub fn new(db: Database, table: &str) -> Result<Self> {
        Ok(Self {
            db,
            table: table.to_string(),
            statements: StatementBuilder::new(table)?,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn log_outcome<T>(&self, operation: &str, result: &Result<T>) {
        let Err(err) = result else {
            return;
        };
        match err.kind() {
            ErrorKind::Transport => {
                error!(table = %self.table, operation, error = %err, "storage operation failed")
            }
            _ => warn!(table = %self.table, operation, error = %err, "storage operation rejected"),
        }
    }
}

impl Storer for Handler {
    fn find(&self, ctx: &Context, query: &Query) -> Result<ItemList> {
        let select = self.statements.select(query)?;
        let count = match query.window {
            Some(_) => Some(self.statements.count(query)?),
            None => None,
        };
        debug!(table = %self.table, "find");

        let result = self.db.run(ctx, "find", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let items = fetch_items(&tx, ctx, &select)?;
            let total = match &count {
                Some(count) => {
                    trace!(sql = %count, "count");
                    let n: i64 = tx.query_row(
                        &count.statement,
                        params_from_iter(count.params.values.iter()),
                        |row| row.get(0),
                    )?;
                    usize::try_from(n).unwrap_or_default()
                }
                None => items.len(),
            };
            ctx.check()?;
            tx.commit()?;
            Ok(ItemList {
                total,
                offset: query.offset(),
                items,
            })
        });
        self.log_outcome("find", &result);
        result
    }

    fn insert(&self, ctx: &Context, items: &[Item]) -> Result<()> {
        let now = Utc::now();
        let inserts = items
            .iter()
            .map(|item| self.statements.insert(item, now))
            .collect::<Result<Vec<_>>>()?;
        debug!(table = %self.table, count = items.len(), "insert");

        let result = self.db.run(ctx, "insert", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for insert in &inserts {
                trace!(sql = %insert, "insert");
                tx.execute(
                    &insert.statement,
                    params_from_iter(insert.params.values.iter()),
                )
                .map_err(StorageError::from_insert)?;
            }
            ctx.check()?;
            tx.commit()?;
            Ok(())
        });
        self.log_outcome("insert", &result);
        result
    }

    fn update(&self, ctx: &Context, item: &Item, original: &Item) -> Result<()> {
        let update = self.statements.update(item, original, Utc::now())?;
        let lookup = self.statements.select_etag(&original.id)?;
        debug!(table = %self.table, id = ?original.id, "update");

        let result = self.db.run(ctx, "update", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            trace!(sql = %update, "update");
            let changed = tx.execute(
                &update.statement,
                params_from_iter(update.params.values.iter()),
            )?;
            if changed == 0 {
                return Err(stale_or_missing(&tx, &lookup));
            }
            ctx.check()?;
            tx.commit()?;
            Ok(())
        });
        self.log_outcome("update", &result);
        result
    }

    fn delete(&self, ctx: &Context, item: &Item) -> Result<()> {
        let delete = self.statements.delete_item(item)?;
        let lookup = self.statements.select_etag(&item.id)?;
        debug!(table = %self.table, id = ?item.id, "delete");

        let result = self.db.run(ctx, "delete", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            trace!(sql = %delete, "delete");
            let removed = tx.execute(
                &delete.statement,
                params_from_iter(delete.params.values.iter()),
            )?;
            if removed == 0 {
                return Err(stale_or_missing(&tx, &lookup));
            }
            ctx.check()?;
            tx.commit()?;
            Ok(())
        });
        self.log_outcome("delete", &result);
        result
    }

    fn clear(&self, ctx: &Context, query: &Query) -> Result<usize> {
        let delete = self.statements.delete(query)?;
        debug!(table = %self.table, "clear");

        let result = self.db.run(ctx, "clear", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            trace!(sql = %delete, "clear");
            let removed = tx.execute(
                &delete.statement,
                params_from_iter(delete.params.values.iter()),
            )?;
            ctx.check()?;
            tx.commit()?;
            Ok(removed)
        });
        self.log_outcome("clear", &result);
        result
    }
}

fn fetch_items(conn: &Connection, ctx: &Context, select: &SqlQuery) -> Result<Vec<Item>> {
    trace!(sql = %select, "select");
    let mut stmt = conn.prepare(&select.statement)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(select.params.values.iter()))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        ctx.check()?;
        items.push(Item::from_row(&names, row)?);
    }
    Ok(items)
}

// A guarded write touched no row: the item is either gone or was changed by
// someone else.
fn stale_or_missing(conn: &Connection, lookup: &SqlQuery) -> StorageError {
    let found = conn
        .query_row(
            &lookup.statement,
            params_from_iter(lookup.params.values.iter()),
            |_| Ok(()),
        )
        .optional();
    match found {
        Ok(Some(())) => StorageError::Conflict,
        Ok(None) => StorageError::NotFound,
        Err(err) => StorageError::from(err),
    }
}
