//! Digital output capability.

use std::sync::{Arc, Mutex, PoisonError};

/// One GPIO-style output line.
pub trait DigitalOutput: Send {
    /// Drive the line high (`true`) or low (`false`).
    fn set_level(&mut self, high: bool);

    /// Level last applied to the line.
    fn level(&self) -> bool;
}

/// Output shared between several RPC handlers.
///
/// All handlers run on the session controller's routine, so the lock is never
/// contended; it only exists to give each handler its own owned value.
pub struct SharedOutput<O> {
    inner: Arc<Mutex<O>>,
}

impl<O> Clone for SharedOutput<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: DigitalOutput> SharedOutput<O> {
    pub fn new(output: O) -> Self {
        Self {
            inner: Arc::new(Mutex::new(output)),
        }
    }
}

impl<O: DigitalOutput> DigitalOutput for SharedOutput<O> {
    fn set_level(&mut self, high: bool) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_level(high);
    }

    fn level(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .level()
    }
}
