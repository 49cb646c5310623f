//! Notification trigger: POST /notify/{group}.
//!
//! Lets the portal backend push a notification to one tenant group after a
//! business event (job created, message sent, price table updated). The
//! request is authenticated according to `LabhubConfig::notify`, then the
//! event is handed to the broadcaster and the call returns immediately:
//! the caller's operation must never depend on real-time delivery.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use labhub_core::{config::NotifyAuthMode, GroupKey};
use labhub_protocol::NotificationEvent;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

// ── Public handler ────────────────────────────────────────────────────────────

/// POST /notify/{group}
///
/// Returns 202 + receipt ID once the event is queued for fan-out, whether or
/// not anyone in the group is connected.
pub async fn notify_handler(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let cfg = &state.config.notify;

    if !cfg.enabled {
        warn!(group = %group, "notify received but trigger is disabled");
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "notify trigger is disabled"})),
        ));
    }

    match &cfg.auth_mode {
        NotifyAuthMode::HmacSha256 => {
            verify_hmac_sha256(&headers, &body, cfg.secret.as_deref())
                .map_err(|e| auth_error(&e))?;
        }
        NotifyAuthMode::BearerToken => {
            verify_bearer_token(&headers, cfg.secret.as_deref()).map_err(|e| auth_error(&e))?;
        }
        NotifyAuthMode::None => {
            // No authentication: operator explicitly opted out.
        }
    }

    let group = GroupKey::parse(&group).map_err(|e| {
        warn!(error = %e, "notify for invalid group");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    let event: NotificationEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(group = %group, error = %e, "invalid notification body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "body must be a JSON object with 'titulo' and 'texto'"})),
        )
    })?;

    let receipt_id = uuid::Uuid::new_v4().to_string();
    info!(group = %group, receipt_id = %receipt_id, titulo = %event.titulo, "notification accepted");
    state.notifier.dispatch(group, event);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"ok": true, "receipt_id": receipt_id})),
    ))
}

// ── Auth helpers ──────────────────────────────────────────────────────────────

/// Verify GitHub-style HMAC-SHA256: `sha256=<hex>` in X-Hub-Signature-256.
fn verify_hmac_sha256(
    headers: &HeaderMap,
    body: &Bytes,
    secret: Option<&str>,
) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no HMAC secret configured for notify".to_string())?;

    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Hub-Signature-256 header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Hub-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

/// Verify a static bearer token in the `Authorization: Bearer <token>` header.
fn verify_bearer_token(headers: &HeaderMap, secret: Option<&str>) -> Result<(), String> {
    let expected = secret.ok_or_else(|| "no bearer token configured for notify".to_string())?;

    let token = crate::auth::extract_bearer(headers)
        .ok_or_else(|| "missing or malformed Authorization header".to_string())?;

    if tokens_match(token, expected) {
        Ok(())
    } else {
        Err("bearer token mismatch".to_string())
    }
}

/// Constant-time equality. Both sides are hashed first so neither the
/// length nor the position of the first differing byte leaks through timing.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Error helpers ─────────────────────────────────────────────────────────────

fn auth_error(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason = %reason, "notify authentication failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication failed", "reason": reason})),
    )
}
