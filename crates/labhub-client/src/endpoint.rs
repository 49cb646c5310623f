use labhub_core::config::API_SUFFIX;
use reqwest::Url;

use crate::error::ClientError;

/// Resolved addresses of the notification hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEndpoint {
    http: Url,
    ws: Url,
}

impl HubEndpoint {
    /// Derive the hub address from the REST base address.
    ///
    /// `https://portal.example/api` + `/hubs/notificacoes` →
    /// `https://portal.example/hubs/notificacoes` (socket: `wss://…`).
    pub fn from_api_base(api_base: &str, hub_path: &str) -> Result<Self, ClientError> {
        let trimmed = api_base.trim().trim_end_matches('/');
        let base = trimmed.strip_suffix(API_SUFFIX).unwrap_or(trimmed);
        let path = if hub_path.starts_with('/') {
            hub_path.to_string()
        } else {
            format!("/{}", hub_path)
        };

        let http = Url::parse(&format!("{}{}", base, path))
            .map_err(|e| ClientError::InvalidEndpoint(format!("{api_base}: {e}")))?;

        let ws_scheme = match http.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ClientError::InvalidEndpoint(format!(
                    "unsupported scheme '{other}' in {api_base}"
                )))
            }
        };
        let mut ws = http.clone();
        ws.set_scheme(ws_scheme)
            .map_err(|_| ClientError::InvalidEndpoint(format!("cannot use {ws_scheme} for {api_base}")))?;

        Ok(Self { http, ws })
    }

    /// Socket URL for a direct (header-authenticated) connection.
    pub fn ws_url(&self) -> &Url {
        &self.ws
    }

    pub fn negotiate_url(&self) -> Url {
        let mut url = self.http.clone();
        let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    /// Socket URL redeeming a negotiate token; the bearer rides in the query
    /// because no header can be attached on this path.
    pub fn redeem_url(&self, connection_token: &str, access_token: &str) -> Url {
        let mut url = self.ws.clone();
        url.query_pairs_mut()
            .append_pair("id", connection_token)
            .append_pair("access_token", access_token);
        url
    }
}
