//! Cooperative cancellation for page and thumbnail rendering.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative request cancellation
///
/// Renderers periodically check `is_cancelled()` to determine whether they
/// should stop. Clones share the same underlying cancellation state.
///
/// # Example
///
/// ```
/// use doc_model::CancellationToken;
///
/// let token = CancellationToken::new();
/// let renderer_token = token.clone();
///
/// // In the renderer:
/// // while rendering {
/// //     if renderer_token.is_cancelled() {
/// //         return Err(DocumentError::Cancelled); // Discard partial work
/// //     }
/// //     // ... render ...
/// // }
///
/// // On the UI thread, when the thumbnail slot is reused:
/// token.cancel();
/// assert!(renderer_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a non-cancelled state.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token
    ///
    /// All clones of this token will also observe the cancellation.
    /// Cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token has been cancelled
    ///
    /// Returns `true` if `cancel()` has been called on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
