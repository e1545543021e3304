//! Error types for the SQLite storage handler.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors produced by the storage handler and the statement layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced item does not exist.
    #[error("not found")]
    NotFound,
    /// The stored version tag differs from the expected one, or the insert
    /// collided with an existing identifier.
    #[error("conflict")]
    Conflict,
    /// The query or item cannot be represented in SQL by this handler.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// The caller's context was cancelled or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,
    /// A row returned by the database could not be mapped to an item.
    #[error("malformed row: {0}")]
    Mapping(String),
    /// The shared connection mutex was poisoned by a panicking holder.
    #[error("connection lock poisoned during {0}")]
    LockPoisoned(&'static str),
    /// Any other driver failure.
    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

/// The error vocabulary exposed to the enclosing framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    NotImplemented,
    Cancelled,
    /// Connectivity, execution or malformed-statement failures.
    Transport,
}

impl StorageError {
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        StorageError::NotImplemented(msg.into())
    }

    /// Collapse the error into the framework's error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound => ErrorKind::NotFound,
            StorageError::Conflict => ErrorKind::Conflict,
            StorageError::NotImplemented(_) => ErrorKind::NotImplemented,
            StorageError::Cancelled => ErrorKind::Cancelled,
            StorageError::Mapping(_)
            | StorageError::LockPoisoned(_)
            | StorageError::Database(_) => ErrorKind::Transport,
        }
    }

    /// Classify a driver error raised while inserting: primary key and
    /// unique violations become `Conflict`.
    pub(crate) fn from_insert(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            {
                return StorageError::Conflict;
            }
        }
        StorageError::from(err)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == ErrorCode::OperationInterrupted =>
            {
                StorageError::Cancelled
            }
            other => StorageError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_interrupt_maps_to_cancelled() {
        let err = StorageError::from(failure(rusqlite::ffi::SQLITE_INTERRUPT));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_insert_constraint_classification() {
        let pk = StorageError::from_insert(failure(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY));
        assert_eq!(pk.kind(), ErrorKind::Conflict);

        let unique = StorageError::from_insert(failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE));
        assert_eq!(unique.kind(), ErrorKind::Conflict);

        // NOT NULL violations are not identifier collisions.
        let not_null = StorageError::from_insert(failure(rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL));
        assert_eq!(not_null.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_kinds_stay_distinct() {
        assert_ne!(StorageError::NotFound.kind(), StorageError::Conflict.kind());
        assert_eq!(
            StorageError::not_implemented("regex").to_string(),
            "not implemented: regex"
        );
    }
}
