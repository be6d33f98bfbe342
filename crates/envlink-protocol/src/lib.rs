//! # envlink-protocol
//!
//! ThingsBoard device MQTT API: topic layout and JSON payload codec.
//!
//! The transports in `envlink-mqtt` and `envlink-esp32` only move bytes; this
//! crate decides what goes on which topic.

pub mod codec;
pub mod messages;
pub mod topics;

pub use codec::*;
pub use messages::*;
pub use topics::*;
