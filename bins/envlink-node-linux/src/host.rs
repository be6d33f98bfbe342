//! Host stand-ins for the board peripherals.

use envlink_core::link::Link;
use envlink_core::model::Reading;
use envlink_core::output::DigitalOutput;
use envlink_core::sensor::{Sensor, SensorError};
use std::net::{IpAddr, UdpSocket};
use tracing::info;

/// Link backed by the host's own network stack.
///
/// The host is assumed to be online; the address is the one the kernel
/// would route from towards the broker.
pub struct HostLink {
    mac: String,
    probe: String,
    up: bool,
}

impl HostLink {
    /// `probe` is a `host:port` used to pick the outbound interface.
    pub fn new(mac: impl Into<String>, probe: impl Into<String>) -> Self {
        Self {
            mac: mac.into(),
            probe: probe.into(),
            up: false,
        }
    }
}

impl Link for HostLink {
    fn begin(&mut self) {
        self.up = true;
    }

    fn is_connected(&self) -> bool {
        self.up
    }

    fn disconnect(&mut self) {
        self.up = false;
    }

    fn reconnect(&mut self) {
        self.up = true;
    }

    fn mac_address(&self) -> String {
        self.mac.clone()
    }

    fn local_ip(&self) -> Option<IpAddr> {
        // connect() on UDP only selects a route, nothing is sent
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(self.probe.as_str()).ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    }
}

/// Slowly drifting temperature and humidity.
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    tick: u32,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sensor for SimulatedSensor {
    fn begin(&mut self) -> bool {
        true
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.tick = self.tick.wrapping_add(1);
        let phase = self.tick as f32 / 60.0;
        Ok(Reading::new(
            26.0 + 2.5 * phase.sin(),
            65.0 + 8.0 * phase.cos(),
        ))
    }
}

/// LED that only logs its level changes.
#[derive(Debug, Default)]
pub struct LoggedLed {
    level: bool,
}

impl DigitalOutput for LoggedLed {
    fn set_level(&mut self, high: bool) {
        self.level = high;
        info!(level = high, "LED set");
    }

    fn level(&self) -> bool {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_sensor_stays_in_range() {
        let mut sensor = SimulatedSensor::new();
        assert!(sensor.begin());
        for _ in 0..500 {
            let reading = sensor.read().unwrap();
            assert!((23.0..=29.0).contains(&reading.temperature));
            assert!((56.0..=74.0).contains(&reading.humidity));
        }
    }

    #[test]
    fn test_host_link_follows_reconnects() {
        let mut link = HostLink::new("02:00:00:00:00:01", "127.0.0.1:1883");
        assert!(!link.is_connected());
        link.begin();
        assert!(link.is_connected());
        link.disconnect();
        assert!(!link.is_connected());
        link.reconnect();
        assert!(link.is_connected());
        assert_eq!(link.mac_address(), "02:00:00:00:00:01");
    }
}
