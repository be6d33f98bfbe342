//! Data types exchanged between the node and the IoT platform.
//!
//! - Sensor readings produced by the sampling routine
//! - Attribute values announced on (re)connection
//! - RPC requests delivered by the transport

use serde::{Deserialize, Serialize};
use std::fmt;

/// Telemetry key for the temperature reading (degrees Celsius).
pub const TELEMETRY_TEMPERATURE: &str = "temperature";
/// Telemetry key for the relative humidity reading (percent).
pub const TELEMETRY_HUMIDITY: &str = "humidity";

/// Attribute keys announced after every successful transport connect.
pub const ATTR_MAC_ADDRESS: &str = "macAddress";
pub const ATTR_IP_ADDRESS: &str = "ipAddress";
pub const ATTR_DEVICE_NAME: &str = "deviceName";
pub const ATTR_LATITUDE: &str = "latitude";
pub const ATTR_LONGITUDE: &str = "longitude";

/// RPC method that drives the LED output.
pub const RPC_SET_LED_SWITCH: &str = "setLedSwitchValue";
/// RPC method that reports the LED output level.
pub const RPC_GET_LED_SWITCH: &str = "getLedSwitchValue";

/// A single successful sensor sample.
///
/// Transient: it only lives for the sampling iteration that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl Reading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

/// Value of a device attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(text) => f.write_str(text),
            AttributeValue::Number(number) => write!(f, "{}", number),
        }
    }
}

/// An inbound remote procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Platform-assigned identifier, echoed in the response topic.
    pub request_id: String,
    /// Method name matched against the dispatcher's registrations.
    pub method: String,
    /// Raw parameters as delivered by the platform.
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(request_id: &str, method: &str, params: serde_json::Value) -> Self {
        Self {
            request_id: request_id.to_string(),
            method: method.to_string(),
            params,
        }
    }
}
