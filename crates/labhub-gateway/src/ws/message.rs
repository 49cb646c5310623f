use labhub_core::{ConnId, LabhubError};
use labhub_protocol::{
    frames::{InboundFrame, ReqFrame, ResFrame},
    methods::PING,
};
use tracing::warn;

/// Process one inbound WS text frame. Returns the response to send, if any.
///
/// The hub is push-only: clients may ping, but there is no method to join,
/// leave or switch groups.
pub fn handle(conn_id: &ConnId, text: &str) -> Option<ResFrame> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "malformed frame");
            return None;
        }
    };

    let req = frame.as_req()?;
    Some(route(&req))
}

fn route(req: &ReqFrame) -> ResFrame {
    match req.method.as_str() {
        PING => ResFrame::ok(&req.id, serde_json::json!({ "pong": true })),
        other => {
            let err = LabhubError::MethodNotFound {
                method: other.to_string(),
            };
            ResFrame::err(&req.id, err.code(), &err.to_string())
        }
    }
}
