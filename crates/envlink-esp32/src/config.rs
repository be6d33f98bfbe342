//! Build-time configuration for ESP32 targets.
//!
//! Credentials are baked in at compile time, e.g.
//!
//! ```text
//! WIFI_SSID=lab WIFI_PASSWORD=secret MQTT_ACCESS_TOKEN=abc cargo build --release
//! ```
//!
//! Anything not set keeps the [`AgentConfig`] default.

use anyhow::{Context, Result};
use envlink_core::config::AgentConfig;

/// Assemble the node configuration from compile-time environment values.
pub fn from_build_env() -> Result<AgentConfig> {
    let mut config = AgentConfig::default();

    if let Some(ssid) = option_env!("WIFI_SSID") {
        config.link.ssid = ssid.to_string();
    }
    if let Some(password) = option_env!("WIFI_PASSWORD") {
        config.link.password = password.to_string();
    }
    if let Some(host) = option_env!("MQTT_HOST") {
        config.broker.host = host.to_string();
    }
    if let Some(port) = option_env!("MQTT_PORT") {
        config.broker.port = port.parse().context("MQTT_PORT is not a port number")?;
    }
    if let Some(token) = option_env!("MQTT_ACCESS_TOKEN") {
        config.broker.access_token = token.to_string();
    }
    if let Some(name) = option_env!("DEVICE_NAME") {
        config.device.name = name.to_string();
    }

    config.link.validate()?;
    config.validate()?;
    Ok(config)
}
