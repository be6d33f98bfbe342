//! Shared environment state.
//!
//! The sampler is the only writer; the session controller (and anything else
//! holding a clone of the handle) reads. The handle is created once at startup
//! and lives for the rest of the process.

use crate::model::Reading;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Last successfully sampled environment values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Environment {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl From<Reading> for Environment {
    fn from(reading: Reading) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}

/// Cloneable handle to the process-wide environment state.
///
/// Both fields are written under one lock, so a reader never observes a
/// temperature from one sample paired with the humidity of another.
#[derive(Debug, Clone, Default)]
pub struct SharedEnvironment {
    inner: Arc<Mutex<Environment>>,
}

impl SharedEnvironment {
    /// Create the state with the zero default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite both fields with a fresh reading.
    pub fn store(&self, reading: Reading) {
        let mut env = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *env = Environment::from(reading);
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> Environment {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
