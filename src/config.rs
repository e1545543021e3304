//! Connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const IN_MEMORY_PATH: &str = ":memory:";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PROGRESS_OPS: i32 = 1_000;

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    /// Keep `*` wildcard matches case-sensitive, like plain equality.
    pub case_sensitive_like: bool,
    /// VM instructions between two cancellation checks.
    pub progress_ops: i32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: IN_MEMORY_PATH.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            case_sensitive_like: true,
            progress_ops: DEFAULT_PROGRESS_OPS,
        }
    }
}

impl SqliteConfig {
    /// Create a new SQLite config for the database at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH).with_journal_mode(JournalMode::Memory)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    pub fn with_case_sensitive_like(mut self, enabled: bool) -> Self {
        self.case_sensitive_like = enabled;
        self
    }

    pub fn with_progress_ops(mut self, ops: i32) -> Self {
        self.progress_ops = ops.max(1);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == IN_MEMORY_PATH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SqliteConfig::new("/tmp/items.db");
        assert_eq!(config.db_path, "/tmp/items.db");
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert!(config.case_sensitive_like);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_builders() {
        let config = SqliteConfig::in_memory()
            .with_busy_timeout(Duration::from_millis(250))
            .with_progress_ops(0)
            .with_case_sensitive_like(false);
        assert!(config.is_in_memory());
        assert_eq!(config.journal_mode, JournalMode::Memory);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.progress_ops, 1);
        assert!(!config.case_sensitive_like);
    }
}
