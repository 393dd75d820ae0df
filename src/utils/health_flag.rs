use crossbeam::utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheaply clonable flag to track worker liveness.
/// Wraps an `AtomicBool` in `Arc<CachePadded<...>>` to avoid false sharing
/// between scan threads polling their neighbours.
#[derive(Clone)]
#[repr(transparent)]
pub struct HealthFlag(Arc<CachePadded<AtomicBool>>);

impl HealthFlag {
    /// Create a new flag with the given initial value.
    #[inline]
    pub fn new(initial: bool) -> Self {
        Self(Arc::new(CachePadded::new(AtomicBool::new(initial))))
    }

    #[inline(always)]
    fn atomic(&self) -> &AtomicBool {
        &self.0
    }

    /// Get the current value (relaxed load).
    #[inline(always)]
    pub fn get(&self) -> bool {
        self.atomic().load(Ordering::Relaxed)
    }

    /// Set the flag (relaxed store).
    #[inline(always)]
    pub fn set(&self, v: bool) {
        self.atomic().store(v, Ordering::Relaxed)
    }

    /// Convenience: mark as alive.
    #[inline(always)]
    pub fn up(&self) {
        self.set(true);
    }

    /// Convenience: mark as stopped.
    #[inline(always)]
    pub fn down(&self) {
        self.set(false);
    }
}

impl Default for HealthFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for HealthFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthFlag")
            .field("value", &self.get())
            .finish()
    }
}
