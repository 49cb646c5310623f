use axum::{
    extract::{ws::Message, ws::WebSocket, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use labhub_core::{
    config::{HEARTBEAT_INTERVAL_SECS, MAX_PAYLOAD_BYTES, PROTOCOL_VERSION},
    ConnId,
};
use labhub_protocol::{
    frames::EventFrame,
    handshake::{ClientPolicy, ServerInfo, Welcome},
    methods::{EVENT_CONNECTED, EVENT_TICK},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::auth::{self, HubClaims};
use crate::ws::presence::{self, Membership};
use crate::ws::{message, send};

#[derive(Debug, Deserialize)]
pub struct HubQuery {
    /// Connection token from a prior negotiate call.
    pub id: Option<String>,
    pub access_token: Option<String>,
}

/// Axum handler: authenticates, then upgrades HTTP to WebSocket at the hub path.
///
/// Unauthenticated callers get 401 and never reach presence binding.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HubQuery>,
) -> Response {
    let claims = match auth::authenticate(&state.config.auth, &headers, query.access_token.as_deref())
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "hub upgrade rejected");
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })))
                .into_response();
        }
    };

    let conn_id = match query.id {
        Some(token) => match state.redeem_negotiation(&token, claims.sub.as_deref()) {
            Some(id) => id,
            None => {
                warn!(sub = ?claims.sub, "unknown, expired or foreign connection token");
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "unknown or expired connection token" })),
                )
                    .into_response();
            }
        },
        None => ConnId::new(),
    };

    ws.max_message_size(MAX_PAYLOAD_BYTES)
        .on_upgrade(move |socket| run_connection(socket, state, conn_id, claims))
}

/// Per-connection event loop: lives for the entire WS session.
async fn run_connection(socket: WebSocket, state: Arc<AppState>, conn_id: ConnId, claims: HubClaims) {
    info!(conn_id = %conn_id, sub = ?claims.sub, "new hub connection");

    let (mut tx, rx) = socket.split();
    let mut membership = presence::bind(&state.hub, &conn_id, &claims);
    state.ws_clients.insert(conn_id.to_string(), Instant::now());

    let hello = EventFrame::new(EVENT_CONNECTED, welcome(&conn_id, &membership));
    if send::json(&mut tx, &hello).await.is_ok() {
        serve(&conn_id, &mut tx, rx, &mut membership, &state).await;
    }

    state.ws_clients.remove(conn_id.as_str());
    membership.leave(&state.hub);
    info!(conn_id = %conn_id, "hub connection closed");
}

async fn serve(
    conn_id: &ConnId,
    tx: &mut send::WsSink,
    mut rx: futures_util::stream::SplitStream<WebSocket>,
    membership: &mut Membership,
    state: &Arc<AppState>,
) {
    let period = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);
    let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(res) = message::handle(conn_id, text.as_str()) {
                            if send::json(tx, &res).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "ws read error");
                        break;
                    }
                    _ => {}
                }
            }
            frame = membership.recv() => {
                match frame {
                    Ok(payload) => {
                        if send::text(tx, payload).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(conn_id = %conn_id, skipped, "slow consumer; notifications dropped");
                    }
                    Err(RecvError::Closed) => {
                        warn!(conn_id = %conn_id, "group channel closed");
                        membership.detach();
                    }
                }
            }
            _ = tick.tick() => {
                let ev = EventFrame::new(
                    EVENT_TICK,
                    json!({ "ts": chrono::Utc::now().timestamp_millis() }),
                )
                .with_seq(state.next_seq());
                if send::json(tx, &ev).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn welcome(conn_id: &ConnId, membership: &Membership) -> Welcome {
    Welcome {
        protocol: PROTOCOL_VERSION,
        conn_id: conn_id.to_string(),
        group: membership.group().map(|g| g.to_string()),
        server: ServerInfo {
            name: "labhub".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        policy: ClientPolicy {
            max_message_size: MAX_PAYLOAD_BYTES,
            heartbeat_secs: HEARTBEAT_INTERVAL_SECS,
        },
    }
}
