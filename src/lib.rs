//! SQLite storage handler for REST resources in the Runar ecosystem.
//!
//! # Intention
//!
//! - Store and query generic resource items (id, etag, timestamps, payload)
//!   in SQLite tables.
//! - Translate the framework's abstract queries (predicate tree, sort,
//!   window) into parameterized SQL.
//! - Enforce optimistic concurrency on every mutation through etag-guarded
//!   statements.
//!
//! # Architectural Boundaries
//!
//! - Only storage code belongs here: no HTTP routing, schema validation or
//!   table provisioning.
//! - Statement construction (`value`, `predicate`, `statement`) never touches
//!   a connection; only `sqlite` executes SQL.

pub mod config;
pub mod context;
pub mod error;
pub mod item;
pub mod predicate;
pub mod query;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use config::{JournalMode, SqliteConfig};
pub use context::Context;
pub use error::{ErrorKind, Result, StorageError};
pub use item::{Item, ItemList};
pub use query::{Expression, Predicate, Query, Sort, SortField, Window};
pub use sqlite::{Database, Handler, Storer};
pub use statement::{SqlQuery, StatementBuilder};
pub use value::{Params, Value};
