//! Node configuration.
//!
//! These types are shared by every target:
//! - Linux: loaded from a TOML file with environment overrides
//! - ESP32: built from compile-time values
//!
//! All sections default to the values the firmware has always shipped with,
//! so a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors found while validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required field is empty.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// A field holds a value outside its valid range.
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub link: LinkConfig,
    pub broker: BrokerConfig,
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub session: SessionOptions,
}

impl AgentConfig {
    /// Check the settings every target needs before the controller starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.is_empty() {
            return Err(ConfigError::Missing("broker.host"));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::Invalid {
                field: "broker.port",
                reason: "port must be non-zero".to_string(),
            });
        }
        if self.broker.access_token.is_empty() {
            return Err(ConfigError::Missing("broker.access_token"));
        }
        if !(-90.0..=90.0).contains(&self.device.latitude) {
            return Err(ConfigError::Invalid {
                field: "device.latitude",
                reason: format!("{} is outside [-90, 90]", self.device.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.device.longitude) {
            return Err(ConfigError::Invalid {
                field: "device.longitude",
                reason: format!("{} is outside [-180, 180]", self.device.longitude),
            });
        }
        self.timing.validate()
    }
}

/// WiFi credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Network SSID.
    pub ssid: String,
    /// Network password (empty for open networks).
    pub password: String,
}

impl LinkConfig {
    /// ESP32 targets cannot associate without an SSID.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::Missing("link.ssid"));
        }
        Ok(())
    }
}

/// IoT platform broker coordinates and device credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Device access token, sent as the MQTT username.
    pub access_token: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "app.coreiot.io".to_string(),
            port: 1883,
            access_token: String::new(),
        }
    }
}

/// Static device facts announced as attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// GPIO number of the LED output (ESP32 only).
    pub led_pin: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "envlink-node".to_string(),
            latitude: 10.795444,
            longitude: 106.678267,
            led_pin: 48,
        }
    }
}

/// Loop periods and retry intervals, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Link association poll interval.
    pub link_poll_ms: u64,
    /// Sleep before each session cycle.
    pub cycle_period_ms: u64,
    /// Yield at the end of a completed session cycle.
    pub cycle_yield_ms: u64,
    /// Wait between two sensor initialization attempts.
    pub sensor_retry_ms: u64,
    /// Sensor stabilization delay after initialization.
    pub sensor_warmup_ms: u64,
    /// Sensor sampling period.
    pub sample_period_ms: u64,
    /// How long a transport waits for the broker to acknowledge a connect.
    pub connect_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            link_poll_ms: 500,
            cycle_period_ms: 1000,
            cycle_yield_ms: 10,
            sensor_retry_ms: 2000,
            sensor_warmup_ms: 5000,
            sample_period_ms: 1000,
            connect_timeout_ms: 5000,
        }
    }
}

impl TimingConfig {
    pub fn link_poll(&self) -> Duration {
        Duration::from_millis(self.link_poll_ms)
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn cycle_yield(&self) -> Duration {
        Duration::from_millis(self.cycle_yield_ms)
    }

    pub fn sensor_retry(&self) -> Duration {
        Duration::from_millis(self.sensor_retry_ms)
    }

    pub fn sensor_warmup(&self) -> Duration {
        Duration::from_millis(self.sensor_warmup_ms)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("timing.link_poll_ms", self.link_poll_ms),
            ("timing.cycle_period_ms", self.cycle_period_ms),
            ("timing.sensor_retry_ms", self.sensor_retry_ms),
            ("timing.sample_period_ms", self.sample_period_ms),
            ("timing.connect_timeout_ms", self.connect_timeout_ms),
        ];
        for (field, value) in periods {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "period must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Session controller behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Clear the RPC subscription flag on every successful reconnect so the
    /// subscription is re-issued. Off by default: a subscription that once
    /// succeeded is never repeated.
    pub resubscribe_on_reconnect: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.broker.access_token = "token".to_string();
        config
    }

    #[test]
    fn test_default_timings() {
        let timing = TimingConfig::default();
        assert_eq!(timing.link_poll(), Duration::from_millis(500));
        assert_eq!(timing.cycle_period(), Duration::from_secs(1));
        assert_eq!(timing.cycle_yield(), Duration::from_millis(10));
        assert_eq!(timing.sensor_retry(), Duration::from_secs(2));
        assert_eq!(timing.sensor_warmup(), Duration::from_secs(5));
        assert_eq!(timing.sample_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_requires_token() {
        assert_eq!(
            AgentConfig::default().validate(),
            Err(ConfigError::Missing("broker.access_token"))
        );
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [broker]
            access_token = "abc123"

            [device]
            name = "greenhouse-1"

            [session]
            resubscribe_on_reconnect = true
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.host, "app.coreiot.io");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.access_token, "abc123");
        assert_eq!(config.device.name, "greenhouse-1");
        assert_eq!(config.device.latitude, 10.795444);
        assert_eq!(config.timing, TimingConfig::default());
        assert!(config.session.resubscribe_on_reconnect);
    }

    #[test]
    fn test_rejects_zero_period() {
        let mut config = valid();
        config.timing.cycle_period_ms = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "timing.cycle_period_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_bad_coordinates() {
        let mut config = valid();
        config.device.latitude = 123.0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "device.latitude",
                ..
            })
        ));
    }

    #[test]
    fn test_link_requires_ssid() {
        assert_eq!(
            LinkConfig::default().validate(),
            Err(ConfigError::Missing("link.ssid"))
        );
    }
}
