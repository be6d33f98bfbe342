//! # envlink-mqtt
//!
//! [`Transport`] implementation over the blocking `rumqttc` client.
//!
//! The client's event loop is driven from the session controller's own
//! thread: every call that needs the network (connect, subscribe, poll) pulls
//! events from the [`Connection`] with a timeout. Publishes are queued with
//! `try_publish` and go out the next time the connection is driven.

use envlink_core::config::{BrokerConfig, TimingConfig};
use envlink_core::model::AttributeValue;
use envlink_core::rpc::RpcDispatcher;
use envlink_core::transport::{Transport, TransportError};
use envlink_protocol::{
    decode_rpc_request, encode_attribute, encode_rpc_response, encode_telemetry, is_rpc_request,
    rpc_response_topic, ATTRIBUTES_TOPIC, RPC_REQUEST_FILTER, TELEMETRY_TOPIC,
};
use rumqttc::{
    Client, ConnectReturnCode, Connection, Event, MqttOptions, Packet, QoS, SubscribeReasonCode,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 32;
const POLL_TIMEOUT: Duration = Duration::from_millis(20);
const MAX_EVENTS_PER_POLL: usize = 64;

/// Device session with a ThingsBoard-style broker.
pub struct MqttTransport {
    client_id: String,
    connect_timeout: Duration,
    poll_timeout: Duration,
    client: Option<Client>,
    connection: Option<Connection>,
    connected: bool,
    /// Publishes received while waiting for an acknowledgement.
    pending: VecDeque<(String, Vec<u8>)>,
}

impl MqttTransport {
    pub fn new(client_id: impl Into<String>, timing: &TimingConfig) -> Self {
        Self {
            client_id: client_id.into(),
            connect_timeout: timing.connect_timeout(),
            poll_timeout: POLL_TIMEOUT,
            client: None,
            connection: None,
            connected: false,
            pending: VecDeque::new(),
        }
    }

    fn close(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.try_disconnect();
        }
        self.connection = None;
        self.connected = false;
        self.pending.clear();
    }

    /// Pull one event, waiting at most `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time. A connection error ends the
    /// session.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>, TransportError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;

        match connection.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(e)) => {
                warn!("MQTT connection lost: {}", e);
                self.close();
                Err(TransportError::Client(e.to_string()))
            }
            Err(_) => Ok(None),
        }
    }

    /// Track session-level packets and buffer inbound publishes.
    fn absorb(&mut self, event: &Event) {
        match event {
            Event::Incoming(Packet::Publish(publish)) => {
                self.pending
                    .push_back((publish.topic.clone(), publish.payload.to_vec()));
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("broker closed the MQTT session");
                self.close();
            }
            _ => {}
        }
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Answer every buffered request. A response that cannot be queued is
    /// logged and the rest are still handled.
    fn dispatch_pending(&mut self, dispatcher: &mut RpcDispatcher) -> usize {
        let mut handled = 0;
        while let Some((topic, payload)) = self.pending.pop_front() {
            let Some((response_topic, body)) = handle_publish(&topic, &payload, dispatcher) else {
                continue;
            };
            match self.publish(&response_topic, body) {
                Ok(()) => handled += 1,
                Err(e) => warn!(topic = %response_topic, "failed to send RPC response: {}", e),
            }
        }
        handled
    }
}

impl Transport for MqttTransport {
    fn connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError> {
        self.close();

        let mut options = MqttOptions::new(self.client_id.as_str(), broker.host.as_str(), broker.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_credentials(broker.access_token.as_str(), "");

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        self.client = Some(client);
        self.connection = Some(connection);

        let connect_error = |reason: String| TransportError::Connect {
            host: broker.host.clone(),
            port: broker.port,
            reason,
        };

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.close();
                return Err(connect_error("timed out waiting for CONNACK".to_string()));
            }
            match self.next_event(remaining) {
                Ok(Some(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        self.close();
                        return Err(connect_error(format!("refused: {:?}", ack.code)));
                    }
                    self.connected = true;
                    debug!(session_present = ack.session_present, "CONNACK received");
                    return Ok(());
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    self.close();
                    return Err(connect_error("timed out waiting for CONNACK".to_string()));
                }
                Err(e) => return Err(connect_error(e.to_string())),
            }
        }
    }

    fn send_attribute(&mut self, key: &str, value: &AttributeValue) -> Result<(), TransportError> {
        let payload =
            encode_attribute(key, value).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.publish(ATTRIBUTES_TOPIC, payload)
    }

    fn send_telemetry(&mut self, key: &str, value: f32) -> Result<(), TransportError> {
        let payload =
            encode_telemetry(key, value).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.publish(TELEMETRY_TOPIC, payload)
    }

    fn subscribe_rpc(&mut self, methods: &[String]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .try_subscribe(RPC_REQUEST_FILTER, QoS::AtLeastOnce)
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        debug!(?methods, filter = RPC_REQUEST_FILTER, "SUBSCRIBE queued");

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match self.next_event(remaining)? {
                Some(event) => event,
                None => return Err(TransportError::Subscribe("timed out waiting for SUBACK".to_string())),
            };
            if let Event::Incoming(Packet::SubAck(ack)) = &event {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    return Err(TransportError::Subscribe("broker rejected subscription".to_string()));
                }
                return Ok(());
            }
            self.absorb(&event);
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            if remaining.is_zero() {
                return Err(TransportError::Subscribe("timed out waiting for SUBACK".to_string()));
            }
        }
    }

    fn poll(&mut self, dispatcher: &mut RpcDispatcher) -> Result<usize, TransportError> {
        let mut handled = self.dispatch_pending(dispatcher);
        for _ in 0..MAX_EVENTS_PER_POLL {
            match self.next_event(self.poll_timeout)? {
                Some(event) => {
                    self.absorb(&event);
                    handled += self.dispatch_pending(dispatcher);
                }
                None => break,
            }
        }
        Ok(handled)
    }
}

/// Turn one inbound publish into the response to send, if any.
///
/// Returns the response topic and body for an RPC request whose method is
/// registered. Other topics, malformed requests and unregistered methods
/// produce nothing.
pub fn handle_publish(
    topic: &str,
    payload: &[u8],
    dispatcher: &mut RpcDispatcher,
) -> Option<(String, Vec<u8>)> {
    if !is_rpc_request(topic) {
        debug!(topic, "ignoring publish on non-RPC topic");
        return None;
    }

    let request = match decode_rpc_request(topic, payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(topic, "dropping malformed RPC request: {}", e);
            return None;
        }
    };

    let response = dispatcher.dispatch(&request)?;
    match encode_rpc_response(&response) {
        Ok(body) => {
            info!(method = %request.method, request_id = %request.request_id, "answering RPC");
            Some((rpc_response_topic(&request.request_id), body))
        }
        Err(e) => {
            warn!("failed to encode RPC response: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envlink_core::testing::RecordingOutput;
    use pretty_assertions::assert_eq;

    fn dispatcher() -> (RpcDispatcher, RecordingOutput) {
        let output = RecordingOutput::new();
        (RpcDispatcher::with_led(output.clone()), output)
    }

    #[test]
    fn test_rpc_publish_yields_response() {
        let (mut dispatcher, output) = dispatcher();

        let response = handle_publish(
            "v1/devices/me/rpc/request/9",
            br#"{"method":"setLedSwitchValue","params":true}"#,
            &mut dispatcher,
        );

        assert_eq!(
            response,
            Some(("v1/devices/me/rpc/response/9".to_string(), b"true".to_vec()))
        );
        assert!(output.level());
    }

    #[test]
    fn test_unknown_method_has_no_response() {
        let (mut dispatcher, output) = dispatcher();

        let response = handle_publish(
            "v1/devices/me/rpc/request/10",
            br#"{"method":"setDoorValue","params":true}"#,
            &mut dispatcher,
        );

        assert_eq!(response, None);
        assert!(output.history().is_empty());
    }

    #[test]
    fn test_non_rpc_and_malformed_publishes_ignored() {
        let (mut dispatcher, output) = dispatcher();

        assert_eq!(
            handle_publish(
                "v1/devices/me/attributes",
                br#"{"method":"setLedSwitchValue","params":true}"#,
                &mut dispatcher
            ),
            None
        );
        assert_eq!(
            handle_publish("v1/devices/me/rpc/request/11", b"{", &mut dispatcher),
            None
        );
        assert!(output.history().is_empty());
    }

    #[test]
    fn test_failed_response_does_not_stop_draining() {
        let mut transport = MqttTransport::new("node", &TimingConfig::default());
        let (mut dispatcher, output) = dispatcher();
        transport.pending.push_back((
            "v1/devices/me/rpc/request/1".to_string(),
            br#"{"method":"setLedSwitchValue","params":true}"#.to_vec(),
        ));
        transport.pending.push_back((
            "v1/devices/me/rpc/request/2".to_string(),
            br#"{"method":"setLedSwitchValue","params":false}"#.to_vec(),
        ));

        // Not connected, so neither response can be queued
        assert_eq!(transport.dispatch_pending(&mut dispatcher), 0);

        assert_eq!(output.history(), vec![true, false]);
        assert!(transport.pending.is_empty());
    }

    #[test]
    fn test_operations_require_connection() {
        let mut transport = MqttTransport::new("node", &TimingConfig::default());
        let (mut dispatcher, _) = dispatcher();

        assert!(!transport.connected());
        assert!(matches!(
            transport.send_telemetry("temperature", 1.0),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.subscribe_rpc(&dispatcher.methods()),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.poll(&mut dispatcher),
            Err(TransportError::NotConnected)
        ));
    }
}
