use serde::{Deserialize, Serialize};

/// Server → Client: response to `POST <hub>/negotiate`.
///
/// The client redeems `connection_token` once by opening the hub socket
/// with `?id=<connection_token>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiateResponse {
    pub connection_id: String,
    pub connection_token: String,
    pub available_transports: Vec<String>,
}

/// Server → Client: payload of the `connected` event that opens every
/// hub session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Welcome {
    pub protocol: u32,
    pub conn_id: String,
    /// Tenant group the connection was bound to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub server: ServerInfo,
    pub policy: ClientPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientPolicy {
    pub max_message_size: usize,
    pub heartbeat_secs: u64,
}
