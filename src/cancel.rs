use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Revocable flag shared by every item of one batch run.
///
/// Clones observe the same flag. A scope is never reset; callers replace it
/// with a fresh one instead so a stale cancel cannot leak into a later run.
#[derive(Debug, Clone, Default)]
pub struct CancellationScope {
    cancelled: Arc<AtomicBool>,
}

impl CancellationScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
