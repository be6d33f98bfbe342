//! # envlink-core
//!
//! Core logic of the envlink telemetry node.
//!
//! This crate provides:
//! - The shared environment state written by the sampler and read by the publisher
//! - The sensor sampling routine
//! - The RPC dispatcher and the LED switch handlers
//! - The connectivity session controller (link, transport, subscription, telemetry)
//! - Configuration types shared by every target
//!
//! This crate is intentionally runtime-agnostic and contains no async code.
//! Hardware and network access go through the traits in [`sensor`], [`link`],
//! [`transport`], [`output`] and [`clock`], so the same controller runs on Linux
//! (rumqttc) and on ESP32 (esp-idf).

pub mod clock;
pub mod config;
pub mod link;
pub mod model;
pub mod output;
pub mod retry;
pub mod rpc;
pub mod sampler;
pub mod sensor;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, StdClock};
pub use config::AgentConfig;
pub use model::*;
pub use rpc::RpcDispatcher;
pub use session::{CycleOutcome, SessionController, SessionPhase, SessionState};
pub use state::{Environment, SharedEnvironment};
