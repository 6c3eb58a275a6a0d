//! The one cancellation handle per network run (spec §5).
//!
//! Cancellation is cooperative and terminal: firing it wakes every port
//! operation currently blocked on a connection, and every subsequent call
//! observes it immediately. There is no resume. Nested cancellations collapse
//! into one (spec §7: "Cancelled is idempotent and non-cumulative").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

/// A cloneable, cheaply-shared cancellation signal.
///
/// Cloning a handle does not create a new signal; all clones share the same
/// underlying flag, so firing one fires all of them. This is how the network
/// derives a per-process handle that still propagates transitively.
#[derive(Clone, Debug)]
pub struct CancellationHandle {
    inner: Arc<Inner>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Fire the handle. Returns `true` the first time it is called; later
    /// calls are no-ops that return `false`, keeping cancellation idempotent.
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Suspend until the handle fires. Every port operation races this
    /// against its buffer op so a blocked send/receive returns promptly
    /// instead of waiting forever.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }

    /// Derive a child handle sharing the same atomic flag, used when handing
    /// cancellation down to a sub-component (e.g. a circuit breaker wrapping
    /// a process). Present for symmetry with the teacher's `Cancellation::child`;
    /// since there is only one flag per network run, this just clones.
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}
