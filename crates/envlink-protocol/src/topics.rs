//! Device API topic names.

/// Telemetry uploads.
pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";

/// Client-side attribute uploads.
pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";

/// Subscription filter for server-side RPC requests.
pub const RPC_REQUEST_FILTER: &str = "v1/devices/me/rpc/request/+";

const RPC_REQUEST_PREFIX: &str = "v1/devices/me/rpc/request/";
const RPC_RESPONSE_PREFIX: &str = "v1/devices/me/rpc/response/";

/// Topic the response to request `request_id` is published on.
pub fn rpc_response_topic(request_id: &str) -> String {
    format!("{}{}", RPC_RESPONSE_PREFIX, request_id)
}

/// Extract the request id from an RPC request topic.
///
/// Returns `None` for any other topic, or if the id segment is empty or
/// nested.
pub fn request_id_from_topic(topic: &str) -> Option<&str> {
    let id = topic.strip_prefix(RPC_REQUEST_PREFIX)?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}

/// Whether `topic` carries an RPC request.
pub fn is_rpc_request(topic: &str) -> bool {
    request_id_from_topic(topic).is_some()
}
