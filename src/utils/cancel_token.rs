use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Shared state of one token. Cancellation is pushed down the tree:
/// cancelling a parent walks its registered children, so a token only
/// ever consults its own flag, and sleepers are woken through the
/// condvar instead of polling on a tick.
struct CancelInner {
    cancelled: AtomicBool,
    sleep_lock: Mutex<()>,
    wake: Condvar,
    children: Mutex<Vec<Weak<CancelInner>>>,
}

impl CancelInner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            sleep_lock: Mutex::new(()),
            wake: Condvar::new(),
            children: Mutex::new(Vec::new()),
        })
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // serialize with sleepers so the wake-up cannot slip between
        // their flag check and the wait
        drop(self.sleep_lock.lock());
        self.wake.notify_all();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

/// Hierarchical cancellation token.
///
/// Apply tears down a whole program generation through one parent
/// token. Scan tasks and samplers park in [`sleep_cancellable`]
/// between iterations and wake the moment their generation is
/// cancelled; teardown joins every task synchronously, so this
/// wake-up latency is what bounds the apply path, not the length of
/// whatever sleep a task happened to be in.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    /// Create a new root cancellation token.
    pub fn new_root() -> Self {
        Self {
            inner: CancelInner::new(),
        }
    }

    /// Create a token that is cancelled together with this one.
    pub fn new_child(&self) -> Self {
        let child = CancelInner::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // the parent may have been cancelled while the child was being
        // registered, in which case the walk above already missed it
        if self.inner.cancelled.load(Ordering::Acquire) {
            child.cancel();
        }
        Self { inner: child }
    }

    /// Cancel this token and every token derived from it.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Park until cancelled or the duration elapses. Returns `false`
    /// when the wait ended in cancellation, `true` on a full sleep.
    pub fn sleep_cancellable(&self, total: Duration) -> bool {
        if total.is_zero() {
            return !self.is_cancelled();
        }
        let deadline = Instant::now() + total;
        let mut guard = self.inner.sleep_lock.lock();
        loop {
            if self.inner.cancelled.load(Ordering::Acquire) {
                return false;
            }
            // spurious wake-ups loop back into the wait
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                return !self.inner.cancelled.load(Ordering::Acquire);
            }
        }
    }
}
