//! Environmental sensor capability.

use crate::model::Reading;
use thiserror::Error;

/// Errors reported by a sensor driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// Driver-specific status code (e.g. DHT20 checksum or timeout codes).
    #[error("sensor returned status code {0}")]
    Status(i8),

    /// The sensor did not answer on its bus.
    #[error("sensor not connected")]
    NotConnected,

    /// Bus-level failure.
    #[error("bus error: {0}")]
    Bus(String),
}

impl SensorError {
    /// Numeric code for diagnostics.
    pub fn code(&self) -> i8 {
        match self {
            SensorError::Status(code) => *code,
            SensorError::NotConnected => -1,
            SensorError::Bus(_) => -2,
        }
    }
}

/// A temperature and humidity sensor.
pub trait Sensor {
    /// Initialize the device. Returns `false` if it is absent or not ready.
    fn begin(&mut self) -> bool;

    /// Take one measurement.
    fn read(&mut self) -> Result<Reading, SensorError>;
}

impl<S: Sensor + ?Sized> Sensor for Box<S> {
    fn begin(&mut self) -> bool {
        (**self).begin()
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        (**self).read()
    }
}
