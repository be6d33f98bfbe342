//! Pub/sub transport capability.
//!
//! A transport is a device-side client of the IoT platform: it connects with
//! an access token, pushes attributes and telemetry, subscribes to RPC
//! requests and, when polled, hands inbound requests to the dispatcher and
//! sends each handler's return value back as the response.

use crate::config::BrokerConfig;
use crate::model::AttributeValue;
use crate::rpc::RpcDispatcher;
use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting to the broker failed or timed out.
    #[error("connect to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// An operation was attempted while not connected.
    #[error("transport not connected")]
    NotConnected,

    /// The broker refused or did not acknowledge the subscription.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// A publish could not be queued.
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Payload encoding failed.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Underlying client error.
    #[error("client error: {0}")]
    Client(String),
}

/// A device session with the IoT platform.
pub trait Transport {
    /// Whether the session is currently established.
    fn connected(&self) -> bool;

    /// Attempt one connection to `broker`.
    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError>;

    /// Publish one client-side attribute.
    fn send_attribute(&mut self, key: &str, value: &AttributeValue) -> Result<(), TransportError>;

    /// Publish one telemetry value.
    fn send_telemetry(&mut self, key: &str, value: f32) -> Result<(), TransportError>;

    /// Subscribe to RPC requests for `methods`.
    fn subscribe_rpc(&mut self, methods: &[String]) -> Result<(), TransportError>;

    /// Process queued inbound messages once.
    ///
    /// Each RPC request for a registered method is dispatched and answered.
    /// Returns the number of requests answered.
    fn poll(&mut self, dispatcher: &mut RpcDispatcher) -> Result<usize, TransportError>;
}
