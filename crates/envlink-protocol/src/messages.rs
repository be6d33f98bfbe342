//! Wire payloads of the device API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a server-side RPC request.
///
/// The request id is not part of the body; it travels in the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequestBody {
    pub method: String,
    /// Absent params decode as `null`.
    #[serde(default)]
    pub params: Value,
}
