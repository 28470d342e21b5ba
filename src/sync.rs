//! Stop signal shared by every blocking operation in a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Interval at which cancellable socket loops re-check the stop flag.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Process-visible cancellation signal for one session.
///
/// Cloned into every cancellable socket loop (connect, header recv) and
/// checked between polls, so [`stop`](Self::stop) interrupts in-progress
/// network I/O within one poll interval. Condition waits on the session
/// state are unblocked separately by `should_stop` plus a condvar
/// signal; both are tripped together by
/// [`Session::stop`](crate::Session::stop).
///
/// `stop` is idempotent and safe to call from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Returns immediately.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
