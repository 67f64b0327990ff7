use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared across one logical operation.
///
/// Once cancelled the flag never resets; the owner replaces the token with
/// a fresh one to start the next operation. Consumers hold clones and poll
/// at suspension points.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

/// Cloneable predicate handle suitable for passing into collaborators
/// that only need to ask "should I stop?".
pub type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the flag. Idempotent; there is no way to unset it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Build an `is_cancelled` predicate bound to this token.
    pub fn checker(&self) -> CancelCheck {
        let flag = self.cancelled.clone();
        Arc::new(move || flag.load(Ordering::Relaxed))
    }
}
