use async_trait::async_trait;
use futures_util::StreamExt;
use labhub_protocol::{handshake::NegotiateResponse, methods::TRANSPORT_WEBSOCKETS};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::{endpoint::HubEndpoint, error::ClientError, types::NegotiationMode};

/// Opens hub sessions. Split out so the connection manager can be driven
/// without a network in tests.
#[async_trait]
pub trait HubTransport: Send + Sync {
    async fn connect(
        &self,
        endpoint: &HubEndpoint,
        token: &str,
        mode: NegotiationMode,
    ) -> Result<Box<dyn HubStream>, ClientError>;
}

/// One open hub session, yielding raw text frames.
#[async_trait]
pub trait HubStream: Send {
    /// Next text frame; `None` once the server closed the session.
    async fn next_frame(&mut self) -> Option<Result<String, ClientError>>;

    async fn close(&mut self);
}

/// WebSocket transport (tokio-tungstenite) with a reqwest negotiate step.
#[derive(Clone, Default)]
pub struct WsTransport {
    http: reqwest::Client,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn negotiate(
        &self,
        endpoint: &HubEndpoint,
        token: &str,
    ) -> Result<NegotiateResponse, ClientError> {
        let response = self
            .http
            .post(endpoint.negotiate_url())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Negotiation(format!(
                "negotiate returned {status}"
            )));
        }

        let negotiated: NegotiateResponse = response.json().await?;
        if !negotiated
            .available_transports
            .iter()
            .any(|t| t == TRANSPORT_WEBSOCKETS)
        {
            return Err(ClientError::Negotiation(format!(
                "server offers no {TRANSPORT_WEBSOCKETS} transport"
            )));
        }
        debug!(connection_id = %negotiated.connection_id, "negotiated hub connection");
        Ok(negotiated)
    }
}

#[async_trait]
impl HubTransport for WsTransport {
    async fn connect(
        &self,
        endpoint: &HubEndpoint,
        token: &str,
        mode: NegotiationMode,
    ) -> Result<Box<dyn HubStream>, ClientError> {
        let request = match mode {
            NegotiationMode::Direct => {
                let mut request = endpoint
                    .ws_url()
                    .as_str()
                    .into_client_request()
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| ClientError::Transport(format!("unusable token: {e}")))?;
                request.headers_mut().insert(AUTHORIZATION, bearer);
                request
            }
            NegotiationMode::Negotiated => {
                let negotiated = self.negotiate(endpoint, token).await?;
                endpoint
                    .redeem_url(&negotiated.connection_token, token)
                    .as_str()
                    .into_client_request()
                    .map_err(|e| ClientError::Transport(e.to_string()))?
            }
        };

        let (socket, response) = connect_async(request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(?mode, status = %response.status(), "hub socket open");

        Ok(Box::new(WsStream { socket }))
    }
}

struct WsStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl HubStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                // pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(ClientError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!(error = %e, "hub socket close");
        }
    }
}
