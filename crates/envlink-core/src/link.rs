//! Network link (WiFi association) capability.

use std::net::IpAddr;
use thiserror::Error;

/// Errors reported while waiting for the link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Association did not complete within a bounded retry policy.
    #[error("link did not associate after {attempts} polls")]
    AssociationTimeout { attempts: u32 },
}

/// Wireless association beneath the MQTT transport.
///
/// Association itself is retried by the link driver; the session controller
/// only polls [`Link::is_connected`] and nudges the driver.
pub trait Link {
    /// Start associating with the configured network.
    fn begin(&mut self);

    /// Whether the link currently has an association and an address.
    fn is_connected(&self) -> bool;

    /// Tear the association down.
    fn disconnect(&mut self);

    /// Ask the driver to re-associate.
    fn reconnect(&mut self);

    /// Station MAC address, formatted `AA:BB:CC:DD:EE:FF`.
    fn mac_address(&self) -> String;

    /// Address assigned to the station, if any.
    fn local_ip(&self) -> Option<IpAddr>;
}

/// Format a 6-byte hardware address the way the platform dashboards show it.
pub fn format_mac(mac: [u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac([0x24, 0x0a, 0xc4, 0x00, 0x1f, 0xee]),
            "24:0A:C4:00:1F:EE"
        );
    }
}
