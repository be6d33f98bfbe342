//! WiFi station link for ESP32.
//!
//! Association is started without blocking; the session controller polls
//! [`Link::is_connected`] and nudges the driver with reconnects.

use anyhow::{anyhow, bail, Result};
use envlink_core::config::LinkConfig;
use envlink_core::link::{format_mac, Link};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, peripheral},
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};
use log::{info, warn};
use std::net::IpAddr;

const UNKNOWN_MAC: &str = "00:00:00:00:00:00";

/// Station-mode WiFi link.
pub struct EspLink {
    wifi: EspWifi<'static>,
    ssid: String,
}

impl EspLink {
    /// Create the driver and apply the station configuration.
    ///
    /// Nothing is started until [`Link::begin`].
    pub fn new(
        modem: impl peripheral::Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        config: &LinkConfig,
    ) -> Result<Self> {
        if config.ssid.is_empty() {
            bail!("WiFi SSID cannot be empty");
        }

        let auth_method = if config.password.is_empty() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let mut wifi = EspWifi::new(modem, sysloop, nvs)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("SSID too long (max 32 chars)"))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Password too long (max 64 chars)"))?,
            auth_method,
            ..Default::default()
        }))?;

        Ok(Self {
            wifi,
            ssid: config.ssid.clone(),
        })
    }
}

impl Link for EspLink {
    fn begin(&mut self) {
        info!("Connecting to '{}'...", self.ssid);
        if let Err(e) = self.wifi.start() {
            warn!("failed to start WiFi: {e:?}");
            return;
        }
        if let Err(e) = self.wifi.connect() {
            warn!("failed to start association: {e:?}");
        }
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi disconnect failed: {e:?}");
        }
    }

    fn reconnect(&mut self) {
        if let Err(e) = self.wifi.connect() {
            warn!("WiFi reconnect failed: {e:?}");
        }
    }

    fn mac_address(&self) -> String {
        match self.wifi.sta_netif().get_mac() {
            Ok(mac) => format_mac(mac),
            Err(e) => {
                warn!("failed to read station MAC: {e:?}");
                UNKNOWN_MAC.to_string()
            }
        }
    }

    fn local_ip(&self) -> Option<IpAddr> {
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        if info.ip.is_unspecified() {
            return None;
        }
        Some(IpAddr::V4(info.ip))
    }
}
