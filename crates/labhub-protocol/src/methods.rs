// Well-known event and method names on the hub wire.

// server → client events
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_NOTIFICATION: &str = "notification";
pub const EVENT_TICK: &str = "tick";

// client → server methods
pub const PING: &str = "ping";

// transports advertised by the negotiate endpoint
pub const TRANSPORT_WEBSOCKETS: &str = "WebSockets";
