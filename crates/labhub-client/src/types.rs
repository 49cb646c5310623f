use serde::{Deserialize, Serialize};

/// Lifecycle of the hub connection.
///
/// `Disconnected → Connecting → Connected`, and `Connected → Reconnecting →
/// Connected` after a transient drop. A failed primary attempt passes back
/// through `Disconnected` before the single fallback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session, never connected, gave up, or stopped.
    Disconnected,

    /// Opening the first connection of this session.
    Connecting,

    /// Live and receiving notifications.
    Connected,

    /// A previously established connection dropped; backoff in progress.
    Reconnecting,
}

/// How the socket handshake is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationMode {
    /// Straight to the WebSocket with the bearer in the `Authorization` header.
    Direct,

    /// `POST <hub>/negotiate` first, then redeem the connection token on the
    /// socket URL. Slower but tolerates proxies that mangle upgrade headers.
    Negotiated,
}

/// Desktop notification permission as the platform reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesktopPermission {
    Granted,
    Denied,
    /// The user has not been asked yet.
    #[default]
    Default,
}

/// One observed change of [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}
