//! ESP32-specific components for envlink nodes.
//!
//! This crate provides the board implementations of the core capabilities:
//! - WiFi station link ([`wifi::EspLink`])
//! - MQTT transport over the ESP-IDF client ([`mqtt::EspMqttTransport`])
//! - DHT20 temperature/humidity sensor on I2C ([`dht20::Dht20`])
//! - LED output on a GPIO ([`gpio::LedOutput`])
//! - FreeRTOS-backed clock ([`FreeRtosClock`])
//! - Build-time configuration ([`config::from_build_env`])
//!
//! # Example
//!
//! ```ignore
//! use envlink_esp32::wifi::EspLink;
//! use envlink_esp32::mqtt::EspMqttTransport;
//!
//! let config = envlink_esp32::config::from_build_env()?;
//! let link = EspLink::new(peripherals.modem, sysloop, Some(nvs), &config.link)?;
//! let transport = EspMqttTransport::new(&config.device.name, &config.timing);
//! ```

pub mod config;
pub mod dht20;
pub mod gpio;
pub mod mqtt;
pub mod wifi;

use envlink_core::Clock;
use esp_idf_hal::delay::FreeRtos;
use std::time::Duration;

/// Clock that yields to the FreeRTOS scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeRtosClock;

impl Clock for FreeRtosClock {
    fn sleep(&self, duration: Duration) {
        FreeRtos::delay_ms(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX));
    }
}
