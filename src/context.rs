//! Caller-side cancellation for storage operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, StorageError};

/// Cancellation signal shared between a caller and the operations it runs.
///
/// Clones observe the same cancel flag. A context is done once [`cancel`]
/// is called or its deadline passes.
///
/// [`cancel`]: Context::cancel
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never done unless cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keep the earlier of the current and the new deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once the context is done.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        assert!(ctx.check().is_ok());
        clone.cancel();
        assert!(ctx.is_done());
        assert!(matches!(ctx.check(), Err(StorageError::Cancelled)));
    }

    #[test]
    fn test_deadline() {
        let ctx = Context::background().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_done());

        let ctx = Context::background().with_timeout(Duration::from_secs(3600));
        assert!(!ctx.is_done());
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let ctx = Context::background()
            .with_deadline(soon)
            .with_timeout(Duration::from_secs(3600));
        assert_eq!(ctx.deadline, Some(soon));
    }
}
