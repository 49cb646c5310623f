//! Bearer verification for hub connections.
//!
//! Tokens are issued by the portal's login flow; the gateway only checks
//! the HS256 signature, expiry and (optionally) issuer, then hands the
//! tenant claims to the presence binder.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use labhub_core::{config::AuthConfig, LabhubError};
use serde::{Deserialize, Serialize};

/// Identity claims the hub cares about. Every field is optional: a valid
/// token without tenant claims still connects, it just joins no group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
    #[serde(rename = "laboratoryId", default)]
    pub laboratory_id: Option<String>,
    #[serde(rename = "clinicaId", default)]
    pub clinica_id: Option<String>,
}

/// Resolve and verify the caller's token.
///
/// The `Authorization: Bearer` header wins; browsers cannot set headers on
/// a WebSocket handshake, so `?access_token=` is accepted as well.
pub fn authenticate(
    config: &AuthConfig,
    headers: &HeaderMap,
    access_token: Option<&str>,
) -> labhub_core::Result<HubClaims> {
    let token = extract_bearer(headers)
        .or(access_token.filter(|t| !t.is_empty()))
        .ok_or_else(|| LabhubError::AuthFailed("missing bearer token".to_string()))?;
    verify_token(token, config)
}

/// Decode and validate a JWT, returning its tenant claims.
pub fn verify_token(token: &str, config: &AuthConfig) -> labhub_core::Result<HubClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    decode::<HubClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| LabhubError::AuthFailed(e.to_string()))
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}
