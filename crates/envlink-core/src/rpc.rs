//! Remote command dispatch.
//!
//! The dispatcher maps RPC method names to handlers. Registration is plain
//! data, so tests can invoke handlers directly without a transport.

use crate::model::{RpcRequest, RPC_GET_LED_SWITCH, RPC_SET_LED_SWITCH};
use crate::output::{DigitalOutput, SharedOutput};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A handler for one RPC method.
///
/// The returned value is sent back as the response payload.
pub trait RpcHandler: Send {
    fn call(&mut self, params: &Value) -> Value;
}

impl<F> RpcHandler for F
where
    F: FnMut(&Value) -> Value + Send,
{
    fn call(&mut self, params: &Value) -> Value {
        self(params)
    }
}

/// Method name → handler map.
#[derive(Default)]
pub struct RpcDispatcher {
    handlers: BTreeMap<String, Box<dyn RpcHandler>>,
}

impl RpcDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the LED switch setter and getter registered on `output`.
    pub fn with_led<O>(output: O) -> Self
    where
        O: DigitalOutput + 'static,
    {
        let shared = SharedOutput::new(output);
        let mut dispatcher = Self::new();
        dispatcher.register(RPC_SET_LED_SWITCH, LedSwitchHandler::new(shared.clone()));
        dispatcher.register(RPC_GET_LED_SWITCH, LedStateHandler::new(shared));
        dispatcher
    }

    /// Register `handler` for `method`, replacing any previous registration.
    pub fn register<H>(&mut self, method: &str, handler: H)
    where
        H: RpcHandler + 'static,
    {
        if self
            .handlers
            .insert(method.to_string(), Box::new(handler))
            .is_some()
        {
            warn!(method, "replaced existing RPC handler");
        }
    }

    /// Registered method names, in sorted order.
    pub fn methods(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Run the handler registered for `request.method`.
    ///
    /// Returns `None` (and invokes nothing) if the method is not registered.
    pub fn dispatch(&mut self, request: &RpcRequest) -> Option<Value> {
        match self.handlers.get_mut(&request.method) {
            Some(handler) => {
                debug!(
                    method = %request.method,
                    request_id = %request.request_id,
                    params = %request.params,
                    "dispatching RPC"
                );
                Some(handler.call(&request.params))
            }
            None => {
                warn!(method = %request.method, "ignoring RPC for unregistered method");
                None
            }
        }
    }
}

impl std::fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Coerce an RPC payload to a boolean.
///
/// - `true`/`false` map to themselves
/// - numbers are `true` when non-zero
/// - an object carrying a `"value"` key is coerced through that value
/// - anything else (strings, null, arrays, other objects) is `false`
pub fn coerce_bool(params: &Value) -> bool {
    match params {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::Object(map) => map.get("value").is_some_and(coerce_bool),
        _ => false,
    }
}

/// `setLedSwitchValue`: applies the requested level and echoes it back.
pub struct LedSwitchHandler<O> {
    output: O,
}

impl<O: DigitalOutput> LedSwitchHandler<O> {
    pub fn new(output: O) -> Self {
        Self { output }
    }
}

impl<O: DigitalOutput> RpcHandler for LedSwitchHandler<O> {
    fn call(&mut self, params: &Value) -> Value {
        let level = coerce_bool(params);
        info!(level, "LED switch state change");
        self.output.set_level(level);
        Value::Bool(level)
    }
}

/// `getLedSwitchValue`: reports the current level without touching the line.
pub struct LedStateHandler<O> {
    output: O,
}

impl<O: DigitalOutput> LedStateHandler<O> {
    pub fn new(output: O) -> Self {
        Self { output }
    }
}

impl<O: DigitalOutput> RpcHandler for LedStateHandler<O> {
    fn call(&mut self, _params: &Value) -> Value {
        Value::Bool(self.output.level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOutput;
    use serde_json::json;

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest::new("1", method, params)
    }

    #[test]
    fn test_set_true_drives_high() {
        let output = RecordingOutput::new();
        let mut dispatcher = RpcDispatcher::with_led(output.clone());

        let response = dispatcher.dispatch(&request(RPC_SET_LED_SWITCH, json!(true)));

        assert_eq!(response, Some(json!(true)));
        assert!(output.level());
        assert_eq!(output.history(), vec![true]);
    }

    #[test]
    fn test_set_false_drives_low() {
        let output = RecordingOutput::new();
        let mut dispatcher = RpcDispatcher::with_led(output.clone());

        dispatcher.dispatch(&request(RPC_SET_LED_SWITCH, json!(true)));
        let response = dispatcher.dispatch(&request(RPC_SET_LED_SWITCH, json!(false)));

        assert_eq!(response, Some(json!(false)));
        assert!(!output.level());
        assert_eq!(output.history(), vec![true, false]);
    }

    #[test]
    fn test_unregistered_method_is_ignored() {
        let output = RecordingOutput::new();
        let mut dispatcher = RpcDispatcher::with_led(output.clone());

        let response = dispatcher.dispatch(&request("setDoorValue", json!(true)));

        assert_eq!(response, None);
        assert!(output.history().is_empty());
    }

    #[test]
    fn test_get_reports_current_level() {
        let output = RecordingOutput::new();
        let mut dispatcher = RpcDispatcher::with_led(output.clone());

        assert_eq!(
            dispatcher.dispatch(&request(RPC_GET_LED_SWITCH, Value::Null)),
            Some(json!(false))
        );

        dispatcher.dispatch(&request(RPC_SET_LED_SWITCH, json!(1)));

        assert_eq!(
            dispatcher.dispatch(&request(RPC_GET_LED_SWITCH, Value::Null)),
            Some(json!(true))
        );
        // Getter never writes the line
        assert_eq!(output.history(), vec![true]);
    }

    #[test]
    fn test_malformed_payload_coerces_to_false() {
        let output = RecordingOutput::new();
        let mut dispatcher = RpcDispatcher::with_led(output.clone());
        dispatcher.dispatch(&request(RPC_SET_LED_SWITCH, json!(true)));

        let response = dispatcher.dispatch(&request(RPC_SET_LED_SWITCH, json!("on")));

        assert_eq!(response, Some(json!(false)));
        assert!(!output.level());
    }

    #[test]
    fn test_coerce_bool() {
        assert!(coerce_bool(&json!(true)));
        assert!(!coerce_bool(&json!(false)));
        assert!(coerce_bool(&json!(1)));
        assert!(coerce_bool(&json!(-2.5)));
        assert!(!coerce_bool(&json!(0)));
        assert!(!coerce_bool(&json!(0.0)));
        assert!(coerce_bool(&json!({"value": true})));
        assert!(!coerce_bool(&json!({"value": "true"})));
        assert!(!coerce_bool(&json!({"state": true})));
        assert!(!coerce_bool(&json!("true")));
        assert!(!coerce_bool(&Value::Null));
        assert!(!coerce_bool(&json!([true])));
    }

    #[test]
    fn test_methods_are_listed() {
        let dispatcher = RpcDispatcher::with_led(RecordingOutput::new());
        assert_eq!(
            dispatcher.methods(),
            vec![
                RPC_GET_LED_SWITCH.to_string(),
                RPC_SET_LED_SWITCH.to_string()
            ]
        );
    }

    #[test]
    fn test_closure_handler() {
        let mut dispatcher = RpcDispatcher::new();
        dispatcher.register("ping", |_: &Value| json!("pong"));

        assert_eq!(
            dispatcher.dispatch(&request("ping", Value::Null)),
            Some(json!("pong"))
        );
    }
}
