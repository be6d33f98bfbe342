//! Suspension points.
//!
//! Every blocking wait in the node goes through [`Clock::sleep`]. Platforms
//! provide an implementation that yields to their scheduler; tests use
//! [`crate::testing::ManualClock`] to record waits without real delay.

use std::time::Duration;

/// Source of blocking waits.
pub trait Clock: Send + Sync {
    /// Suspend the calling routine for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Clock backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
