//! MQTT transport over the ESP-IDF client.
//!
//! The ESP-IDF client delivers events on its connection object, which must be
//! pumped from a dedicated thread. That thread forwards the events over a
//! channel; the transport drains the channel when the controller needs an
//! answer (connect, subscribe) or polls.

use envlink_core::config::{BrokerConfig, TimingConfig};
use envlink_core::model::AttributeValue;
use envlink_core::rpc::RpcDispatcher;
use envlink_core::transport::{Transport, TransportError};
use envlink_protocol::{
    decode_rpc_request, encode_attribute, encode_rpc_response, encode_telemetry, is_rpc_request,
    rpc_response_topic, ATTRIBUTES_TOPIC, RPC_REQUEST_FILTER, TELEMETRY_TOPIC,
};
use embedded_svc::mqtt::client::QoS;
use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const EVENT_THREAD_STACK: usize = 6 * 1024;

/// Events forwarded from the connection thread.
enum MqttEvent {
    Connected,
    Disconnected,
    Subscribed(u32),
    Received { topic: String, data: Vec<u8> },
}

/// Device session with a ThingsBoard-style broker.
pub struct EspMqttTransport {
    client_id: String,
    connect_timeout: Duration,
    client: Option<EspMqttClient<'static>>,
    events: Option<Receiver<MqttEvent>>,
    connected: bool,
    pending: VecDeque<(String, Vec<u8>)>,
}

impl EspMqttTransport {
    pub fn new(client_id: &str, timing: &TimingConfig) -> Self {
        Self {
            client_id: client_id.to_string(),
            connect_timeout: timing.connect_timeout(),
            client: None,
            events: None,
            connected: false,
            pending: VecDeque::new(),
        }
    }

    fn close(&mut self) {
        // Dropping the client ends the connection thread
        self.client = None;
        self.events = None;
        self.connected = false;
        self.pending.clear();
    }

    /// Wait at most `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<MqttEvent>, TransportError> {
        let events = self.events.as_ref().ok_or(TransportError::NotConnected)?;
        let event = match events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.close();
                return Err(TransportError::Client("MQTT event thread ended".to_string()));
            }
        };

        match event {
            MqttEvent::Disconnected => {
                warn!("MQTT session lost");
                self.connected = false;
            }
            MqttEvent::Received { ref topic, ref data } => {
                self.pending.push_back((topic.clone(), data.clone()));
            }
            _ => {}
        }
        Ok(Some(event))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
        client
            .enqueue(topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: format!("{e:?}"),
            })
    }

    fn dispatch_pending(&mut self, dispatcher: &mut RpcDispatcher) -> usize {
        let mut handled = 0;
        while let Some((topic, data)) = self.pending.pop_front() {
            if !is_rpc_request(&topic) {
                continue;
            }
            let request = match decode_rpc_request(&topic, &data) {
                Ok(request) => request,
                Err(e) => {
                    warn!("dropping malformed RPC request on {topic}: {e}");
                    continue;
                }
            };
            let Some(response) = dispatcher.dispatch(&request) else {
                continue;
            };
            let body = match encode_rpc_response(&response) {
                Ok(body) => body,
                Err(e) => {
                    warn!("failed to encode RPC response: {e}");
                    continue;
                }
            };
            let response_topic = rpc_response_topic(&request.request_id);
            match self.publish(&response_topic, &body) {
                Ok(()) => handled += 1,
                Err(e) => warn!("failed to send RPC response on {response_topic}: {e}"),
            }
        }
        handled
    }
}

/// Pump the connection until the client is dropped.
fn forward_events(mut connection: EspMqttConnection, tx: Sender<MqttEvent>) {
    while let Ok(event) = connection.next() {
        let forwarded = match event.payload() {
            EventPayload::Connected(_) => MqttEvent::Connected,
            EventPayload::Disconnected => MqttEvent::Disconnected,
            EventPayload::Subscribed(id) => MqttEvent::Subscribed(id),
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => MqttEvent::Received {
                topic: topic.to_string(),
                data: data.to_vec(),
            },
            _ => continue,
        };
        if tx.send(forwarded).is_err() {
            break;
        }
    }
    info!("MQTT connection closed");
}

impl Transport for EspMqttTransport {
    fn connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError> {
        self.close();

        let connect_error = |reason: String| TransportError::Connect {
            host: broker.host.clone(),
            port: broker.port,
            reason,
        };

        let url = format!("mqtt://{}:{}", broker.host, broker.port);
        let conf = MqttClientConfiguration {
            client_id: Some(self.client_id.as_str()),
            username: Some(broker.access_token.as_str()),
            ..Default::default()
        };
        let (client, connection) =
            EspMqttClient::new(&url, &conf).map_err(|e| connect_error(format!("{e:?}")))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("mqtt-events".to_string())
            .stack_size(EVENT_THREAD_STACK)
            .spawn(move || forward_events(connection, tx))
            .map_err(|e| connect_error(e.to_string()))?;

        self.client = Some(client);
        self.events = Some(rx);

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining) {
                Ok(Some(MqttEvent::Connected)) => {
                    self.connected = true;
                    return Ok(());
                }
                Ok(Some(MqttEvent::Disconnected)) => {
                    self.close();
                    return Err(connect_error("broker closed the connection".to_string()));
                }
                Ok(Some(_)) if !remaining.is_zero() => continue,
                Ok(_) => {
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
        self.publish(ATTRIBUTES_TOPIC, &payload)
    }

    fn send_telemetry(&mut self, key: &str, value: f32) -> Result<(), TransportError> {
        let payload =
            encode_telemetry(key, value).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.publish(TELEMETRY_TOPIC, &payload)
    }

    fn subscribe_rpc(&mut self, methods: &[String]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
        let id = client
            .subscribe(RPC_REQUEST_FILTER, QoS::AtLeastOnce)
            .map_err(|e| TransportError::Subscribe(format!("{e:?}")))?;
        debug!("SUBSCRIBE {RPC_REQUEST_FILTER} for {methods:?} (id {id})");

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining)? {
                Some(MqttEvent::Subscribed(acked)) if acked == id => return Ok(()),
                Some(_) if !self.connected => return Err(TransportError::NotConnected),
                Some(_) if !remaining.is_zero() => continue,
                _ => {
                    return Err(TransportError::Subscribe(
                        "timed out waiting for SUBACK".to_string(),
                    ))
                }
            }
        }
    }

    fn poll(&mut self, dispatcher: &mut RpcDispatcher) -> Result<usize, TransportError> {
        while self.next_event(Duration::ZERO)?.is_some() {}
        Ok(self.dispatch_pending(dispatcher))
    }
}
