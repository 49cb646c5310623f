//! Negotiate endpoint: POST <hub>/negotiate
//!
//! Fallback path for clients whose direct socket attempt was refused (no
//! `Authorization` header on the handshake, proxies stripping it, …). The
//! caller authenticates here with a plain HTTP request and receives a
//! single-use connection token to redeem on the socket URL.
//!
//! Response: `{"connection_id": "...", "connection_token": "...", "available_transports": ["WebSockets"]}`

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use labhub_protocol::{handshake::NegotiateResponse, methods::TRANSPORT_WEBSOCKETS};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth;

pub async fn negotiate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<NegotiateResponse>, (StatusCode, Json<Value>)> {
    let claims = auth::authenticate(&state.config.auth, &headers, None).map_err(|e| {
        warn!(error = %e, "negotiate rejected");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized. Set 'Authorization: Bearer <token>' header." })),
        )
    })?;

    let (connection_token, conn_id) = state.begin_negotiation(claims.sub.clone());
    info!(conn_id = %conn_id, sub = ?claims.sub, "negotiated hub connection");

    Ok(Json(NegotiateResponse {
        connection_id: conn_id.to_string(),
        connection_token,
        available_transports: vec![TRANSPORT_WEBSOCKETS.to_string()],
    }))
}
