// Request and response bodies for the relay's admin push API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/admin/broadcast`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastRequest {
    pub message: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastResponse {
    /// Number of connection outboxes that accepted the message.
    pub delivered: usize,
}

/// `POST /api/admin/send`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendRequest {
    pub conn_id: String,
    pub message: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub delivered: bool,
}

/// Query string of `GET /api/admin/onlines`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineUsersQuery {
    /// Optional user-id filter; `*` matches any run of characters.
    #[serde(default)]
    pub uname: Option<String>,
}
