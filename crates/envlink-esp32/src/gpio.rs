//! LED output on a GPIO pin.

use anyhow::Result;
use envlink_core::output::DigitalOutput;
use esp_idf_hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::peripheral::Peripheral;
use log::{info, warn};

/// Push-pull output driving the status LED.
pub struct LedOutput {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    level: bool,
}

impl LedOutput {
    /// Configure `pin` as an output, initially low.
    pub fn new(pin: impl Peripheral<P = impl OutputPin> + 'static) -> Result<Self> {
        let mut pin = PinDriver::output(pin.into_ref().map_into::<AnyOutputPin>())?;
        pin.set_low()?;
        Ok(Self { pin, level: false })
    }
}

impl DigitalOutput for LedOutput {
    fn set_level(&mut self, high: bool) {
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => {
                self.level = high;
                info!("LED {}", if high { "on" } else { "off" });
            }
            Err(e) => warn!("failed to drive LED: {e:?}"),
        }
    }

    fn level(&self) -> bool {
        self.level
    }
}
