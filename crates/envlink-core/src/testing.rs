//! Scriptable doubles for the node's capabilities.
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! integration tests and downstream crates.

use crate::clock::Clock;
use crate::config::BrokerConfig;
use crate::link::Link;
use crate::model::{AttributeValue, Reading, RpcRequest};
use crate::output::DigitalOutput;
use crate::rpc::RpcDispatcher;
use crate::sensor::{Sensor, SensorError};
use crate::transport::{Transport, TransportError};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Clock
// ============================================================================

/// Clock that records requested sleeps and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    /// Simulated time elapsed.
    pub fn total_slept(&self) -> Duration {
        lock(&self.sleeps).iter().sum()
    }

    pub fn clear(&self) {
        lock(&self.sleeps).clear();
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Default)]
struct OutputInner {
    level: bool,
    history: Vec<bool>,
}

/// Output line that remembers every level written to it.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    inner: Arc<Mutex<OutputInner>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of the line.
    pub fn level(&self) -> bool {
        lock(&self.inner).level
    }

    /// Levels written, oldest first.
    pub fn history(&self) -> Vec<bool> {
        lock(&self.inner).history.clone()
    }
}

impl DigitalOutput for RecordingOutput {
    fn set_level(&mut self, high: bool) {
        let mut inner = lock(&self.inner);
        inner.level = high;
        inner.history.push(high);
    }

    fn level(&self) -> bool {
        lock(&self.inner).level
    }
}

// ============================================================================
// Sensor
// ============================================================================

/// Sensor with scripted `begin` failures and read results.
///
/// Reads past the end of the script fail with [`SensorError::NotConnected`].
#[derive(Debug, Default)]
pub struct MockSensor {
    begin_failures: u32,
    reads: VecDeque<Result<Reading, SensorError>>,
}

impl MockSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` calls to `begin`.
    pub fn with_begin_failures(mut self, count: u32) -> Self {
        self.begin_failures = count;
        self
    }

    /// Append one read result to the script.
    pub fn then_read(mut self, result: Result<Reading, SensorError>) -> Self {
        self.reads.push_back(result);
        self
    }
}

impl Sensor for MockSensor {
    fn begin(&mut self) -> bool {
        if self.begin_failures > 0 {
            self.begin_failures -= 1;
            return false;
        }
        true
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.reads
            .pop_front()
            .unwrap_or(Err(SensorError::NotConnected))
    }
}

// ============================================================================
// Link
// ============================================================================

#[derive(Debug)]
struct LinkInner {
    connected: bool,
    polls_until_up: Option<u32>,
    reconnects_until_up: Option<u32>,
    began: bool,
    disconnects: u32,
    reconnects: u32,
    ip: Option<IpAddr>,
}

/// Link whose association is driven by the test.
#[derive(Debug, Clone)]
pub struct MockLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl MockLink {
    pub const MAC: &'static str = "24:0A:C4:00:1F:EE";

    fn with_state(connected: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LinkInner {
                connected,
                polls_until_up: None,
                reconnects_until_up: None,
                began: false,
                disconnects: 0,
                reconnects: 0,
                ip: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))),
            })),
        }
    }

    /// Link that is already associated.
    pub fn connected() -> Self {
        Self::with_state(true)
    }

    /// Link that never associates on its own.
    pub fn disconnected() -> Self {
        Self::with_state(false)
    }

    /// Start down and report connected after `polls` negative status checks.
    pub fn with_connect_after(self, polls: u32) -> Self {
        {
            let mut inner = lock(&self.inner);
            inner.connected = false;
            inner.polls_until_up = Some(polls);
        }
        self
    }

    /// Report no station address.
    pub fn without_ip(self) -> Self {
        lock(&self.inner).ip = None;
        self
    }

    /// Lose the association; it comes back after `reconnects` reconnect calls.
    pub fn drop_link(&mut self, reconnects: u32) {
        let mut inner = lock(&self.inner);
        inner.connected = false;
        inner.polls_until_up = None;
        inner.reconnects_until_up = Some(reconnects);
    }

    pub fn began(&self) -> bool {
        lock(&self.inner).began
    }

    pub fn disconnects(&self) -> u32 {
        lock(&self.inner).disconnects
    }

    pub fn reconnects(&self) -> u32 {
        lock(&self.inner).reconnects
    }
}

impl Link for MockLink {
    fn begin(&mut self) {
        lock(&self.inner).began = true;
    }

    fn is_connected(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.connected {
            return true;
        }
        match inner.polls_until_up {
            Some(0) => {
                inner.connected = true;
                inner.polls_until_up = None;
                true
            }
            Some(remaining) => {
                inner.polls_until_up = Some(remaining - 1);
                false
            }
            None => false,
        }
    }

    fn disconnect(&mut self) {
        let mut inner = lock(&self.inner);
        inner.disconnects += 1;
        inner.connected = false;
    }

    fn reconnect(&mut self) {
        let mut inner = lock(&self.inner);
        inner.reconnects += 1;
        if let Some(remaining) = inner.reconnects_until_up {
            let remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                inner.connected = true;
                inner.reconnects_until_up = None;
            } else {
                inner.reconnects_until_up = Some(remaining);
            }
        }
    }

    fn mac_address(&self) -> String {
        Self::MAC.to_string()
    }

    fn local_ip(&self) -> Option<IpAddr> {
        lock(&self.inner).ip
    }
}

// ============================================================================
// Transport
// ============================================================================

/// One call observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// host, port, access token
    Connect(String, u16, String),
    Attribute(String, Value),
    Telemetry(String, f32),
    Subscribe(Vec<String>),
    Poll,
}

/// Transport with scripted connect/subscribe results and an inbound queue.
///
/// Connects and subscribes succeed once their scripts run out.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: bool,
    connect_results: VecDeque<bool>,
    subscribe_results: VecDeque<bool>,
    fail_publishes: bool,
    inbound: VecDeque<RpcRequest>,
    responses: Vec<(String, Value)>,
    calls: Vec<TransportCall>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.connect_results.extend(results);
        self
    }

    pub fn with_subscribe_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.subscribe_results.extend(results);
        self
    }

    /// Make every attribute and telemetry publish fail.
    pub fn failing_publishes(mut self) -> Self {
        self.fail_publishes = true;
        self
    }

    /// Simulate the broker dropping the session.
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    /// Queue an inbound RPC request for the next poll.
    pub fn queue_rpc(&mut self, request: RpcRequest) {
        self.inbound.push_back(request);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.clone()
    }

    /// Telemetry published, in order.
    pub fn telemetry(&self) -> Vec<(String, f32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Telemetry(key, value) => Some((key.clone(), *value)),
                _ => None,
            })
            .collect()
    }

    /// RPC responses sent: request id and payload.
    pub fn responses(&self) -> Vec<(String, Value)> {
        self.responses.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Connect(..)))
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Subscribe(_)))
    }

    pub fn poll_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Poll))
    }

    fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn publish_result(&self, topic: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publishes {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError> {
        self.calls.push(TransportCall::Connect(
            broker.host.clone(),
            broker.port,
            broker.access_token.clone(),
        ));
        if self.connect_results.pop_front().unwrap_or(true) {
            self.connected = true;
            Ok(())
        } else {
            Err(TransportError::Connect {
                host: broker.host.clone(),
                port: broker.port,
                reason: "scripted failure".to_string(),
            })
        }
    }

    fn send_attribute(&mut self, key: &str, value: &AttributeValue) -> Result<(), TransportError> {
        let json =
            serde_json::to_value(value).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.calls
            .push(TransportCall::Attribute(key.to_string(), json));
        self.publish_result("attributes")
    }

    fn send_telemetry(&mut self, key: &str, value: f32) -> Result<(), TransportError> {
        self.calls
            .push(TransportCall::Telemetry(key.to_string(), value));
        self.publish_result("telemetry")
    }

    fn subscribe_rpc(&mut self, methods: &[String]) -> Result<(), TransportError> {
        self.calls.push(TransportCall::Subscribe(methods.to_vec()));
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.subscribe_results.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(TransportError::Subscribe("scripted failure".to_string()))
        }
    }

    fn poll(&mut self, dispatcher: &mut RpcDispatcher) -> Result<usize, TransportError> {
        self.calls.push(TransportCall::Poll);
        let mut handled = 0;
        while let Some(request) = self.inbound.pop_front() {
            if let Some(response) = dispatcher.dispatch(&request) {
                self.responses.push((request.request_id.clone(), response));
                handled += 1;
            }
        }
        Ok(handled)
    }
}
