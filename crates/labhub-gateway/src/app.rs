use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use labhub_core::{config::NEGOTIATE_TTL_SECS, ConnId, LabhubConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::notifier::Notifier;
use crate::ws::broadcast::TenantHub;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: LabhubConfig,
    pub hub: Arc<TenantHub>,
    pub notifier: Notifier,
    /// Active hub connections: conn_id -> connected-at.
    pub ws_clients: DashMap<String, Instant>,
    /// Outstanding negotiate tokens: connection_token -> pending handshake.
    pub negotiations: DashMap<String, PendingNegotiation>,
}

impl AppState {
    pub fn new(config: LabhubConfig) -> Self {
        let hub = Arc::new(TenantHub::new());
        Self {
            config,
            notifier: Notifier::new(Arc::clone(&hub)),
            hub,
            ws_clients: DashMap::new(),
            negotiations: DashMap::new(),
        }
    }

    /// Monotonically increasing sequence shared by every pushed event.
    pub fn next_seq(&self) -> u64 {
        self.notifier.next_seq()
    }

    /// Record a negotiate handshake for subject `sub` and return its
    /// single-use token.
    pub fn begin_negotiation(&self, sub: Option<String>) -> (String, ConnId) {
        self.negotiations
            .retain(|_, pending| pending.issued.elapsed() < negotiate_ttl());
        let token = uuid::Uuid::new_v4().simple().to_string();
        let conn_id = ConnId::new();
        self.negotiations.insert(
            token.clone(),
            PendingNegotiation {
                conn_id: conn_id.clone(),
                sub,
                issued: Instant::now(),
            },
        );
        (token, conn_id)
    }

    /// Consume a negotiate token on behalf of `sub`. `None` if unknown,
    /// already used, expired or issued to another subject; a token
    /// presented by the wrong subject stays redeemable by its owner.
    pub fn redeem_negotiation(&self, token: &str, sub: Option<&str>) -> Option<ConnId> {
        self.negotiations
            .remove_if(token, |_, pending| pending.sub.as_deref() == sub)
            .filter(|(_, pending)| pending.issued.elapsed() < negotiate_ttl())
            .map(|(_, pending)| pending.conn_id)
    }
}

/// A negotiate token awaiting its socket.
pub struct PendingNegotiation {
    pub conn_id: ConnId,
    /// `sub` claim of the caller that negotiated.
    pub sub: Option<String>,
    pub issued: Instant,
}

fn negotiate_ttl() -> Duration {
    Duration::from_secs(NEGOTIATE_TTL_SECS)
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let hub_path = state.config.gateway.hub_path.clone();
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(&hub_path, get(crate::ws::connection::ws_handler))
        .route(
            &format!("{}/negotiate", hub_path),
            post(crate::http::negotiate::negotiate_handler),
        )
        .route("/notify/{group}", post(crate::http::notify::notify_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{auth_config, sign};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use futures_util::StreamExt;
    use labhub_core::config::{NotifyAuthMode, NotifyConfig};
    use serde_json::{json, Value};
    use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let mut config = LabhubConfig::default();
        config.auth = auth_config();
        config.notify = NotifyConfig {
            enabled: true,
            auth_mode: NotifyAuthMode::BearerToken,
            secret: Some("svc".to_string()),
        };
        Arc::new(AppState::new(config))
    }

    #[test]
    fn negotiation_token_is_single_use() {
        let state = test_state();
        let (token, conn_id) = state.begin_negotiation(Some("u1".into()));
        assert_eq!(state.redeem_negotiation(&token, Some("u1")), Some(conn_id));
        assert_eq!(state.redeem_negotiation(&token, Some("u1")), None);
        assert_eq!(state.redeem_negotiation("unknown", Some("u1")), None);
    }

    #[test]
    fn negotiation_token_is_bound_to_its_subject() {
        let state = test_state();
        let (token, conn_id) = state.begin_negotiation(Some("lab-user".into()));
        assert_eq!(state.redeem_negotiation(&token, Some("clinic-user")), None);
        assert_eq!(state.redeem_negotiation(&token, None), None);
        assert_eq!(
            state.redeem_negotiation(&token, Some("lab-user")),
            Some(conn_id)
        );
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let app = build_router(test_state());
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["ws_clients"], 0);
        assert_eq!(json["groups"], 0);
    }

    #[tokio::test]
    async fn negotiate_requires_bearer() {
        let app = build_router(test_state());
        let res = app
            .oneshot(
                Request::post("/hubs/notificacoes/negotiate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn negotiate_issues_connection_token() {
        let state = test_state();
        let app = build_router(Arc::clone(&state));
        let token = sign(json!({"type": "Clinic", "clinicaId": "C1"}));
        let res = app
            .oneshot(
                Request::post("/hubs/notificacoes/negotiate")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let neg: labhub_protocol::handshake::NegotiateResponse =
            serde_json::from_slice(&body).unwrap();
        assert_eq!(neg.available_transports, vec!["WebSockets".to_string()]);
        assert!(state.redeem_negotiation(&neg.connection_token, None).is_some());
    }

    async fn spawn_server(state: Arc<AppState>) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("ws error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn hub_rejects_unauthenticated_upgrade() {
        let addr = spawn_server(test_state()).await;
        let result =
            tokio_tungstenite::connect_async(format!("ws://{addr}/hubs/notificacoes")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn laboratory_connection_receives_its_notifications_only() {
        let state = test_state();
        let addr = spawn_server(Arc::clone(&state)).await;

        let lab_token = sign(json!({"type": "Laboratory", "laboratoryId": "L1"}));
        let mut request = format!("ws://{addr}/hubs/notificacoes")
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {lab_token}").parse().unwrap());
        let (mut lab_ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

        let clinic_token = sign(json!({"type": "Clinic", "clinicaId": "C1"}));
        let (mut clinic_ws, _) = tokio_tungstenite::connect_async(format!(
            "ws://{addr}/hubs/notificacoes?access_token={clinic_token}"
        ))
        .await
        .unwrap();

        let welcome = next_json(&mut lab_ws).await;
        assert_eq!(welcome["event"], "connected");
        assert_eq!(welcome["payload"]["group"], "Lab_L1");
        let welcome = next_json(&mut clinic_ws).await;
        assert_eq!(welcome["payload"]["group"], "Clinica_C1");

        let app = build_router(Arc::clone(&state));
        let res = app
            .oneshot(
                Request::post("/notify/Lab_L1")
                    .header("authorization", "Bearer svc")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"titulo":"Novo Trabalho","texto":"Pedido #42"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        let pushed = next_json(&mut lab_ws).await;
        assert_eq!(pushed["event"], "notification");
        assert_eq!(pushed["payload"]["titulo"], "Novo Trabalho");
        assert_eq!(pushed["payload"]["texto"], "Pedido #42");

        let quiet = tokio::time::timeout(Duration::from_millis(200), clinic_ws.next()).await;
        assert!(quiet.is_err(), "clinic must not see the lab's notification");
    }
}
