//! Connectivity session controller.
//!
//! Keeps the link, the transport session and the RPC subscription alive, and
//! interleaves telemetry publication with inbound command handling. The
//! states
//!
//! ```text
//! LinkDown -> TransportDown -> Unsubscribed -> Subscribed
//! ```
//!
//! are not modelled as an explicit machine; one repeating cycle re-checks each
//! layer in order and short-circuits when a layer cannot be brought up:
//!
//! 1. link health: blocking re-association until the link is back
//! 2. transport health: one connect attempt, then the device attributes
//! 3. subscription: one subscribe attempt, then the MAC attribute again
//! 4. telemetry: temperature and humidity from the shared state
//! 5. poll: inbound RPC requests are dispatched and answered
//!
//! A failed connect or subscribe ends the cycle early; the next cycle retries.
//!
//! The subscription flag is not cleared when the transport drops, so after a
//! reconnect the RPC subscription is only re-issued if it never succeeded
//! before. [`SessionOptions::resubscribe_on_reconnect`] opts out of that.

use crate::clock::Clock;
use crate::config::{AgentConfig, BrokerConfig, DeviceConfig, SessionOptions, TimingConfig};
use crate::link::{Link, LinkError};
use crate::model::{
    AttributeValue, ATTR_DEVICE_NAME, ATTR_IP_ADDRESS, ATTR_LATITUDE, ATTR_LONGITUDE,
    ATTR_MAC_ADDRESS, TELEMETRY_HUMIDITY, TELEMETRY_TEMPERATURE,
};
use crate::retry::RetryPolicy;
use crate::rpc::RpcDispatcher;
use crate::state::SharedEnvironment;
use crate::transport::Transport;
use std::convert::Infallible;
use tracing::{debug, error, info, warn};

/// Address announced when the link reports none.
const UNSPECIFIED_IP: &str = "0.0.0.0";

/// Session flags, updated as the cycle observes each layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub link_up: bool,
    pub transport_up: bool,
    pub commands_subscribed: bool,
}

/// Coarse view of [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    LinkDown,
    TransportDown,
    Unsubscribed,
    Subscribed,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        if !self.link_up {
            SessionPhase::LinkDown
        } else if !self.transport_up {
            SessionPhase::TransportDown
        } else if !self.commands_subscribed {
            SessionPhase::Unsubscribed
        } else {
            SessionPhase::Subscribed
        }
    }
}

/// How one cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Telemetry was published and the transport polled.
    Completed { commands_handled: usize },
    /// The link could not be re-associated within a bounded policy.
    LinkDown,
    /// The connect attempt failed; the rest of the cycle was skipped.
    TransportConnectFailed,
    /// The subscribe attempt failed; the rest of the cycle was skipped.
    SubscribeFailed,
}

/// Owns the transport and the RPC dispatcher and drives them forever.
pub struct SessionController<L, T, C> {
    link: L,
    transport: T,
    clock: C,
    dispatcher: RpcDispatcher,
    env: SharedEnvironment,
    broker: BrokerConfig,
    device: DeviceConfig,
    timing: TimingConfig,
    options: SessionOptions,
    link_policy: RetryPolicy,
    state: SessionState,
}

impl<L, T, C> SessionController<L, T, C>
where
    L: Link,
    T: Transport,
    C: Clock,
{
    pub fn new(
        link: L,
        transport: T,
        clock: C,
        dispatcher: RpcDispatcher,
        env: SharedEnvironment,
        config: &AgentConfig,
    ) -> Self {
        Self {
            link,
            transport,
            clock,
            dispatcher,
            env,
            broker: config.broker.clone(),
            device: config.device.clone(),
            timing: config.timing.clone(),
            options: config.session.clone(),
            link_policy: RetryPolicy::unbounded(config.timing.link_poll()),
            state: SessionState::default(),
        }
    }

    /// Replace the link polling policy (unbounded by default).
    pub fn with_link_policy(mut self, policy: RetryPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn dispatcher_mut(&mut self) -> &mut RpcDispatcher {
        &mut self.dispatcher
    }

    /// Start associating and block until the link is up.
    pub fn bootstrap(&mut self) -> Result<(), LinkError> {
        self.link.begin();

        let link = &self.link;
        let attempts = self.link_policy.run(&self.clock, |_| {
            if link.is_connected() {
                return true;
            }
            debug!("connecting to WiFi...");
            false
        });

        match attempts {
            Some(_) => {
                self.state.link_up = true;
                info!(ip = %self.ip_address(), "connected to WiFi");
                Ok(())
            }
            None => Err(self.link_timeout()),
        }
    }

    /// Bootstrap, then run cycles forever.
    ///
    /// Only returns if a bounded link policy gives up during bootstrap.
    pub fn run(&mut self) -> Result<Infallible, LinkError> {
        self.bootstrap()?;
        loop {
            let outcome = self.tick();
            debug!(?outcome, phase = ?self.state.phase(), "session cycle finished");
        }
    }

    /// Run one full cycle, including its sleeps.
    pub fn tick(&mut self) -> CycleOutcome {
        self.clock.sleep(self.timing.cycle_period());

        if !self.ensure_link() {
            return CycleOutcome::LinkDown;
        }

        if !self.transport.connected() {
            self.state.transport_up = false;
            if !self.connect_transport() {
                return CycleOutcome::TransportConnectFailed;
            }
        }
        self.state.transport_up = true;

        if !self.state.commands_subscribed && !self.subscribe_commands() {
            return CycleOutcome::SubscribeFailed;
        }

        self.publish_telemetry();

        let commands_handled = match self.transport.poll(&mut self.dispatcher) {
            Ok(handled) => handled,
            Err(e) => {
                warn!("transport poll failed: {}", e);
                0
            }
        };

        self.clock.sleep(self.timing.cycle_yield());
        CycleOutcome::Completed { commands_handled }
    }

    /// Re-associate if the link dropped. Returns whether the link is up.
    fn ensure_link(&mut self) -> bool {
        if self.link.is_connected() {
            self.state.link_up = true;
            return true;
        }

        warn!("WiFi disconnected, attempting reconnection");
        self.state.link_up = false;
        self.link.disconnect();

        let link = &mut self.link;
        let attempts = self.link_policy.run(&self.clock, |_| {
            if link.is_connected() {
                return true;
            }
            link.reconnect();
            debug!("reconnecting to WiFi...");
            false
        });

        match attempts {
            Some(_) => {
                self.state.link_up = true;
                info!("reconnected to WiFi");
                true
            }
            None => {
                error!("{}", self.link_timeout());
                false
            }
        }
    }

    /// One connect attempt; on success announce the device attributes.
    fn connect_transport(&mut self) -> bool {
        info!(
            host = %self.broker.host,
            port = self.broker.port,
            "connecting to MQTT broker"
        );
        if let Err(e) = self.transport.connect(&self.broker) {
            warn!("failed to connect to MQTT broker: {}", e);
            return false;
        }
        info!("connected to MQTT broker");

        if self.options.resubscribe_on_reconnect {
            self.state.commands_subscribed = false;
        }

        let attributes = [
            (ATTR_MAC_ADDRESS, AttributeValue::from(self.link.mac_address())),
            (ATTR_IP_ADDRESS, AttributeValue::from(self.ip_address())),
            (ATTR_DEVICE_NAME, AttributeValue::from(self.device.name.as_str())),
            (ATTR_LATITUDE, AttributeValue::from(self.device.latitude)),
            (ATTR_LONGITUDE, AttributeValue::from(self.device.longitude)),
        ];
        for (key, value) in &attributes {
            self.send_attribute(key, value);
        }
        true
    }

    /// One subscribe attempt; on success mark subscribed and re-send the MAC.
    fn subscribe_commands(&mut self) -> bool {
        let methods = self.dispatcher.methods();
        info!(?methods, "subscribing for RPC");
        if let Err(e) = self.transport.subscribe_rpc(&methods) {
            warn!("failed to subscribe for RPC: {}", e);
            return false;
        }
        info!("RPC subscribe done");
        self.state.commands_subscribed = true;

        let mac = AttributeValue::from(self.link.mac_address());
        self.send_attribute(ATTR_MAC_ADDRESS, &mac);
        true
    }

    fn publish_telemetry(&mut self) {
        let env = self.env.snapshot();
        for (key, value) in [
            (TELEMETRY_TEMPERATURE, env.temperature),
            (TELEMETRY_HUMIDITY, env.humidity),
        ] {
            if let Err(e) = self.transport.send_telemetry(key, value) {
                warn!(key, "failed to send telemetry: {}", e);
            }
        }
    }

    fn send_attribute(&mut self, key: &str, value: &AttributeValue) {
        if let Err(e) = self.transport.send_attribute(key, value) {
            warn!(key, "failed to send attribute: {}", e);
        }
    }

    fn ip_address(&self) -> String {
        self.link
            .local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNSPECIFIED_IP.to_string())
    }

    fn link_timeout(&self) -> LinkError {
        LinkError::AssociationTimeout {
            attempts: self.link_policy.max_attempts.unwrap_or_default(),
        }
    }
}
