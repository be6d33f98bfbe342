//! JSON codec for device API payloads.
//!
//! Telemetry and attributes are sent one key per message, the way the node
//! has always published them.

use crate::messages::RpcRequestBody;
use crate::topics::request_id_from_topic;
use envlink_core::model::{AttributeValue, RpcRequest};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during payload encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The message did not arrive on an RPC request topic.
    #[error("not an RPC request topic: {0}")]
    NotRpcTopic(String),
}

/// Encode a single telemetry value as `{"<key>": <value>}`.
///
/// The value is written with its shortest `f32` representation, so a sample
/// of `60.2` goes out as `60.2`.
pub fn encode_telemetry(key: &str, value: f32) -> Result<Vec<u8>, CodecError> {
    let body = BTreeMap::from([(key, value)]);
    serde_json::to_vec(&body).map_err(CodecError::from)
}

/// Encode a single attribute as `{"<key>": <value>}`.
pub fn encode_attribute(key: &str, value: &AttributeValue) -> Result<Vec<u8>, CodecError> {
    encode_single(key, serde_json::to_value(value)?)
}

/// Encode an RPC handler's return value as the response body.
pub fn encode_rpc_response(value: &Value) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::from)
}

/// Decode an RPC request received on `topic`.
pub fn decode_rpc_request(topic: &str, payload: &[u8]) -> Result<RpcRequest, CodecError> {
    let request_id =
        request_id_from_topic(topic).ok_or_else(|| CodecError::NotRpcTopic(topic.to_string()))?;
    let body: RpcRequestBody = serde_json::from_slice(payload)?;
    Ok(RpcRequest::new(request_id, &body.method, body.params))
}

fn encode_single(key: &str, value: Value) -> Result<Vec<u8>, CodecError> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    serde_json::to_vec(&Value::Object(map)).map_err(CodecError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn as_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_encode_telemetry() {
        let payload = encode_telemetry("temperature", 23.5).unwrap();
        assert_eq!(payload, br#"{"temperature":23.5}"#.to_vec());
    }

    #[test]
    fn test_telemetry_keeps_sampled_precision() {
        let payload = encode_telemetry("humidity", 60.2).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"{"humidity":60.2}"#
        );
    }

    #[test]
    fn test_nan_telemetry_is_null() {
        let payload = encode_telemetry("humidity", f32::NAN).unwrap();
        assert_eq!(as_json(&payload), json!({ "humidity": null }));
    }

    #[test]
    fn test_encode_attributes() {
        let text = encode_attribute("macAddress", &AttributeValue::from("24:0A:C4:00:1F:EE"))
            .unwrap();
        let number = encode_attribute("latitude", &AttributeValue::from(10.795444)).unwrap();

        assert_eq!(as_json(&text), json!({ "macAddress": "24:0A:C4:00:1F:EE" }));
        assert_eq!(as_json(&number), json!({ "latitude": 10.795444 }));
    }

    #[test]
    fn test_decode_rpc_request() {
        let request = decode_rpc_request(
            "v1/devices/me/rpc/request/15",
            br#"{"method":"setLedSwitchValue","params":true}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            RpcRequest::new("15", "setLedSwitchValue", json!(true))
        );
    }

    #[test]
    fn test_decode_without_params() {
        let request =
            decode_rpc_request("v1/devices/me/rpc/request/3", br#"{"method":"getLedSwitchValue"}"#)
                .unwrap();

        assert_eq!(request.params, Value::Null);
    }

    #[test]
    fn test_decode_rejects_other_topics() {
        let err = decode_rpc_request(
            "v1/devices/me/attributes",
            br#"{"method":"setLedSwitchValue","params":true}"#,
        )
        .unwrap_err();

        assert!(matches!(err, CodecError::NotRpcTopic(_)));
    }

    #[test]
    fn test_decode_rejects_malformed_body() {
        let err = decode_rpc_request("v1/devices/me/rpc/request/1", b"{\"params\":1}").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));

        let err = decode_rpc_request("v1/devices/me/rpc/request/1", b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_encode_rpc_response() {
        assert_eq!(encode_rpc_response(&json!(true)).unwrap(), b"true".to_vec());
    }
}
