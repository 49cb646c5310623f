use std::sync::Arc;

use labhub_core::config::{ReconnectConfig, HEARTBEAT_INTERVAL_SECS};
use labhub_protocol::{
    handshake::Welcome,
    methods::{EVENT_CONNECTED, EVENT_NOTIFICATION},
    InboundFrame, NotificationEvent,
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::{sleep, timeout, Duration},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    credentials::TokenStore,
    endpoint::HubEndpoint,
    surface::NotificationSurface,
    transport::{HubStream, HubTransport},
    types::{ConnectionState, NegotiationMode, StateTransition},
};

/// Jitter fraction applied to each delay (±10 %).
const JITTER_FRACTION: f64 = 0.10;

/// Transitions buffered for slow observers before they start lagging.
const TRANSITION_CAPACITY: usize = 32;

/// Heartbeats that may go missing before a silent session counts as dropped.
const MISSED_HEARTBEATS: u32 = 2;

/// Reconnect schedule for a previously established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(cfg: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.base_delay_ms),
            max: Duration::from_millis(cfg.max_delay_ms),
            max_attempts: cfg.max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// Schedule: base → 2×base → 4×base → … capped at `max`, each with ±10 %
    /// jitter and never above `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let doublings = attempt.saturating_sub(1).min(20);
        let delay_ms = base_ms.saturating_mul(1u64 << doublings).min(max_ms);
        Duration::from_millis(jittered_ms(delay_ms).min(max_ms))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

/// Current state plus the transition feed.
struct StateCell {
    current: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StateTransition>,
}

impl StateCell {
    fn new() -> Self {
        let (current, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            current,
            transitions,
        }
    }

    fn get(&self) -> ConnectionState {
        *self.current.borrow()
    }

    fn set(&self, to: ConnectionState) {
        let mut from = to;
        let changed = self.current.send_if_modified(|state| {
            from = *state;
            if *state == to {
                return false;
            }
            *state = to;
            true
        });
        if changed {
            debug!(?from, ?to, "hub connection state");
            let _ = self.transitions.send(StateTransition { from, to });
        }
    }
}

/// Everything the connection task needs, shared with the manager.
struct Session {
    endpoint: HubEndpoint,
    tokens: Arc<dyn TokenStore>,
    transport: Arc<dyn HubTransport>,
    surface: Arc<NotificationSurface>,
    policy: ReconnectPolicy,
    state: StateCell,
}

struct Running {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Owns the hub connection for one user session.
///
/// Created at login, [`start`](Self::start)ed once a session token exists and
/// [`stop`](Self::stop)ped at logout. A failed primary attempt gets exactly
/// one negotiated fallback; after that only a connection that was once
/// established is retried, always in the mode that worked.
pub struct ConnectionManager {
    session: Arc<Session>,
    running: Mutex<Option<Running>>,
    idle_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        endpoint: HubEndpoint,
        tokens: Arc<dyn TokenStore>,
        transport: Arc<dyn HubTransport>,
        surface: Arc<NotificationSurface>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            session: Arc::new(Session {
                endpoint,
                tokens,
                transport,
                surface,
                policy,
                state: StateCell::new(),
            }),
            running: Mutex::new(None),
            idle_timeout: Duration::from_secs(HEARTBEAT_INTERVAL_SECS) * MISSED_HEARTBEATS,
        }
    }

    /// How long a session may stay silent before it is treated as dropped.
    /// Replaced per session by the heartbeat the server announces in its
    /// welcome.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state.get()
    }

    /// Latest-value view of the state, for waiting on a particular state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.state.current.subscribe()
    }

    /// Every transition from now on, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.session.state.transitions.subscribe()
    }

    /// Open the hub connection and keep it alive in the background.
    ///
    /// Returns the state reached: `Connected`, or `Disconnected` when there
    /// is no session token or both negotiation modes failed. Calling this
    /// while a connection task is alive is a no-op.
    pub async fn start(&self) -> ConnectionState {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return self.state();
        }

        let session = &self.session;
        let Some(token) = session.tokens.token() else {
            info!("no session token; hub connection not started");
            return ConnectionState::Disconnected;
        };

        session.state.set(ConnectionState::Connecting);
        let (stream, mode) = match session
            .transport
            .connect(&session.endpoint, &token, NegotiationMode::Direct)
            .await
        {
            Ok(stream) => (stream, NegotiationMode::Direct),
            Err(e) => {
                warn!(error = %e, "direct hub connection failed, trying negotiated fallback");
                session.state.set(ConnectionState::Disconnected);
                session.state.set(ConnectionState::Connecting);
                match session
                    .transport
                    .connect(&session.endpoint, &token, NegotiationMode::Negotiated)
                    .await
                {
                    Ok(stream) => (stream, NegotiationMode::Negotiated),
                    Err(e) => {
                        error!(
                            endpoint = %session.endpoint.ws_url(),
                            error = %e,
                            "hub unreachable in both negotiation modes; not retrying"
                        );
                        session.state.set(ConnectionState::Disconnected);
                        return ConnectionState::Disconnected;
                    }
                }
            }
        };

        session.state.set(ConnectionState::Connected);
        info!(?mode, endpoint = %session.endpoint.ws_url(), "hub connected");

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.session),
            stream,
            mode,
            self.idle_timeout,
            cancel.clone(),
        ));
        *running = Some(Running { handle, cancel });
        ConnectionState::Connected
    }

    /// Close the connection and cancel any pending reconnect.
    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!(error = %e, "hub connection task ended abnormally");
            }
        }
        self.session.state.set(ConnectionState::Disconnected);
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

async fn run(
    session: Arc<Session>,
    mut stream: Box<dyn HubStream>,
    mode: NegotiationMode,
    idle_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = pump(stream.as_mut(), &session.surface, idle_timeout) => false,
        };
        if cancelled {
            stream.close().await;
            return;
        }

        warn!(?mode, "hub connection dropped");
        session.state.set(ConnectionState::Reconnecting);
        match reconnect(&session, mode, &cancel).await {
            Some(next) => {
                stream = next;
                session.state.set(ConnectionState::Connected);
            }
            None => {
                session.state.set(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

/// Handle frames until the session ends or goes silent for `idle`.
async fn pump(stream: &mut dyn HubStream, surface: &NotificationSurface, mut idle: Duration) {
    loop {
        let text = match timeout(idle, stream.next_frame()).await {
            Ok(Some(Ok(text))) => text,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "hub read failed");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                warn!(idle_ms = idle.as_millis() as u64, "hub silent past heartbeat; assuming dead link");
                return;
            }
        };
        if let Some(heartbeat) = handle_frame(&text, surface).await {
            idle = heartbeat * MISSED_HEARTBEATS;
        }
    }
}

/// Act on one frame. Returns the server heartbeat when the frame is the
/// session welcome.
async fn handle_frame(text: &str, surface: &NotificationSurface) -> Option<Duration> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(error = %e, "ignoring unparsable hub frame");
            return None;
        }
    };
    let event = frame.as_event()?;

    match event.event.as_str() {
        EVENT_NOTIFICATION => {
            match event
                .payload
                .map(serde_json::from_value::<NotificationEvent>)
            {
                Some(Ok(notification)) => surface.present(&notification).await,
                _ => warn!(seq = ?event.seq, "malformed notification payload"),
            }
            None
        }
        EVENT_CONNECTED => {
            let welcome = event.payload.map(serde_json::from_value::<Welcome>);
            match welcome {
                Some(Ok(welcome)) => {
                    debug!(conn_id = %welcome.conn_id, group = ?welcome.group, "hub welcome");
                    Some(welcome.policy.heartbeat_secs)
                        .filter(|secs| *secs > 0)
                        .map(Duration::from_secs)
                }
                _ => None,
            }
        }
        // heartbeat ticks and anything newer than this client
        _ => None,
    }
}

/// Re-open the session in `mode` with exponential backoff and ±10 % jitter.
async fn reconnect(
    session: &Session,
    mode: NegotiationMode,
    cancel: &CancellationToken,
) -> Option<Box<dyn HubStream>> {
    let policy = session.policy;

    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_for(attempt);
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = sleep(delay) => {}
        }

        let Some(token) = session.tokens.token() else {
            info!("session token gone; not reconnecting");
            return None;
        };

        let attempted = tokio::select! {
            _ = cancel.cancelled() => return None,
            r = session.transport.connect(&session.endpoint, &token, mode) => r,
        };
        match attempted {
            Ok(stream) => {
                info!(?mode, attempt, "hub reconnected");
                return Some(stream);
            }
            Err(e) => warn!(
                ?mode,
                attempt,
                max = policy.max_attempts,
                error = %e,
                "hub reconnect failed"
            ),
        }
    }

    error!(attempts = policy.max_attempts, "giving up on hub reconnection");
    None
}

/// Apply ±`JITTER_FRACTION` to `base_ms`.
///
/// Uses a simple pseudo-random value derived from the current wall clock,
/// avoiding a rand dependency.
fn jittered_ms(base_ms: u64) -> u64 {
    let spread = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if spread == 0 {
        return base_ms;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let offset = nanos % (2 * spread + 1);
    (base_ms + offset).saturating_sub(spread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::LocalBus,
        error::ClientError,
        bus::Topic,
        surface::fakes::{eventually, FakeAudio, FakeDesktop, FakePreferences, RecordingToaster},
        types::DesktopPermission,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(2);

    /// Token store the test can log out of.
    struct SessionToken(StdMutex<Option<String>>);

    impl SessionToken {
        fn new(token: Option<&str>) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(token.map(str::to_string))))
        }

        fn clear(&self) {
            *self.0.lock().unwrap() = None;
        }
    }

    impl TokenStore for SessionToken {
        fn token(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Transport whose connect outcomes are scripted in order; anything past
    /// the script succeeds. Each success hands back a sender that feeds the
    /// opened stream; dropping it ends that session.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: StdMutex<VecDeque<bool>>,
        calls: StdMutex<Vec<NegotiationMode>>,
        feeds: StdMutex<Vec<mpsc::UnboundedSender<String>>>,
    }

    impl ScriptedTransport {
        fn with(outcomes: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: StdMutex::new(outcomes.iter().copied().collect()),
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<NegotiationMode> {
            self.calls.lock().unwrap().clone()
        }

        fn take_feed(&self, idx: usize) -> mpsc::UnboundedSender<String> {
            self.feeds.lock().unwrap()[idx].clone()
        }

        /// End session `idx` by dropping every sender held for it.
        fn drop_session(&self, idx: usize) {
            let (tx, _rx) = mpsc::unbounded_channel();
            self.feeds.lock().unwrap()[idx] = tx;
        }
    }

    struct FeedStream(mpsc::UnboundedReceiver<String>);

    #[async_trait]
    impl HubStream for FeedStream {
        async fn next_frame(&mut self) -> Option<Result<String, ClientError>> {
            self.0.recv().await.map(Ok)
        }

        async fn close(&mut self) {
            self.0.close();
        }
    }

    #[async_trait]
    impl HubTransport for ScriptedTransport {
        async fn connect(
            &self,
            _endpoint: &HubEndpoint,
            _token: &str,
            mode: NegotiationMode,
        ) -> Result<Box<dyn HubStream>, ClientError> {
            self.calls.lock().unwrap().push(mode);
            let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
            if !ok {
                return Err(ClientError::Transport("refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.feeds.lock().unwrap().push(tx);
            Ok(Box::new(FeedStream(rx)))
        }
    }

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(5),
            max: Duration::from_millis(20),
            max_attempts,
        }
    }

    fn manager(
        token: Option<&'static str>,
        transport: Arc<ScriptedTransport>,
        policy: ReconnectPolicy,
    ) -> (ConnectionManager, Arc<RecordingToaster>) {
        manager_with(
            SessionToken::new(token),
            transport,
            policy,
            FakeDesktop::new(DesktopPermission::Denied, DesktopPermission::Denied),
            LocalBus::new(),
        )
    }

    fn manager_with(
        tokens: Arc<SessionToken>,
        transport: Arc<ScriptedTransport>,
        policy: ReconnectPolicy,
        desktop: FakeDesktop,
        bus: LocalBus,
    ) -> (ConnectionManager, Arc<RecordingToaster>) {
        let toaster = Arc::new(RecordingToaster::default());
        let surface = NotificationSurface::new(
            toaster.clone(),
            Arc::new(FakeAudio::default()),
            Arc::new(desktop),
            Arc::new(FakePreferences::default()),
            bus,
        );
        let endpoint =
            HubEndpoint::from_api_base("http://localhost:5080/api", "/hubs/notificacoes").unwrap();
        let mgr = ConnectionManager::new(endpoint, tokens, transport, Arc::new(surface), policy);
        (mgr, toaster)
    }

    fn notification(titulo: &str, texto: &str) -> String {
        serde_json::json!({
            "type": "event",
            "event": "notification",
            "payload": { "titulo": titulo, "texto": texto },
        })
        .to_string()
    }

    async fn next(rx: &mut broadcast::Receiver<StateTransition>) -> StateTransition {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for transition")
            .expect("transition feed closed")
    }

    fn t(from: ConnectionState, to: ConnectionState) -> StateTransition {
        StateTransition { from, to }
    }

    use ConnectionState::*;

    #[tokio::test]
    async fn no_token_means_no_connection_attempt() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, _) = manager(None, transport.clone(), fast_policy(3));
        let mut transitions = mgr.subscribe_transitions();

        assert_eq!(mgr.start().await, Disconnected);
        assert_eq!(mgr.state(), Disconnected);
        assert!(transport.calls().is_empty());
        assert!(transitions.try_recv().is_err());
    }

    #[tokio::test]
    async fn direct_connection_goes_connecting_then_connected() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        let mut transitions = mgr.subscribe_transitions();

        assert_eq!(mgr.start().await, Connected);
        assert_eq!(next(&mut transitions).await, t(Disconnected, Connecting));
        assert_eq!(next(&mut transitions).await, t(Connecting, Connected));
        assert_eq!(transport.calls(), vec![NegotiationMode::Direct]);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn failed_direct_attempt_falls_back_once() {
        let transport = ScriptedTransport::with(&[false]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        let mut transitions = mgr.subscribe_transitions();

        assert_eq!(mgr.start().await, Connected);
        assert_eq!(next(&mut transitions).await, t(Disconnected, Connecting));
        assert_eq!(next(&mut transitions).await, t(Connecting, Disconnected));
        assert_eq!(next(&mut transitions).await, t(Disconnected, Connecting));
        assert_eq!(next(&mut transitions).await, t(Connecting, Connected));
        assert_eq!(
            transport.calls(),
            vec![NegotiationMode::Direct, NegotiationMode::Negotiated]
        );
        mgr.stop().await;
    }

    #[tokio::test]
    async fn both_modes_failing_leaves_disconnected_without_retry() {
        let transport = ScriptedTransport::with(&[false, false]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));

        assert_eq!(mgr.start().await, Disconnected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mgr.state(), Disconnected);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn drop_reconnects_in_same_mode_without_fallback() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        mgr.start().await;
        let mut transitions = mgr.subscribe_transitions();

        transport.drop_session(0);
        assert_eq!(next(&mut transitions).await, t(Connected, Reconnecting));
        assert_eq!(next(&mut transitions).await, t(Reconnecting, Connected));
        assert_eq!(
            transport.calls(),
            vec![NegotiationMode::Direct, NegotiationMode::Direct]
        );
        mgr.stop().await;
    }

    #[tokio::test]
    async fn reconnect_reuses_negotiated_mode() {
        let transport = ScriptedTransport::with(&[false]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        mgr.start().await;
        let mut transitions = mgr.subscribe_transitions();

        transport.drop_session(0);
        assert_eq!(next(&mut transitions).await, t(Connected, Reconnecting));
        assert_eq!(next(&mut transitions).await, t(Reconnecting, Connected));
        assert_eq!(
            transport.calls(),
            vec![
                NegotiationMode::Direct,
                NegotiationMode::Negotiated,
                NegotiationMode::Negotiated
            ]
        );
        mgr.stop().await;
    }

    #[tokio::test]
    async fn exhausted_reconnects_end_disconnected() {
        let transport = ScriptedTransport::with(&[true, false, false]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(2));
        mgr.start().await;
        let mut transitions = mgr.subscribe_transitions();

        transport.drop_session(0);
        assert_eq!(next(&mut transitions).await, t(Connected, Reconnecting));
        assert_eq!(next(&mut transitions).await, t(Reconnecting, Disconnected));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn notification_frames_reach_the_surface() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, toaster) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        mgr.start().await;

        let feed = transport.take_feed(0);
        feed.send(r#"{"type":"event","event":"tick","payload":{"ts":1}}"#.into())
            .unwrap();
        feed.send("not json".into()).unwrap();
        feed.send(
            r#"{"type":"event","event":"notification","payload":{"titulo":"Novo Trabalho","texto":"Pedido #42"},"seq":1}"#
                .into(),
        )
        .unwrap();

        tokio::time::timeout(WAIT, async {
            while toaster.shown.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            toaster.shown.lock().unwrap()[0].0,
            "Novo Trabalho \n Pedido #42"
        );
        assert_eq!(mgr.state(), Connected);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn unanswered_permission_prompt_does_not_stall_the_connection() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, toaster) = manager_with(
            SessionToken::new(Some("jwt")),
            transport.clone(),
            fast_policy(3),
            FakeDesktop::unanswered(),
            LocalBus::new(),
        );
        mgr.start().await;

        let feed = transport.take_feed(0);
        feed.send(notification("A", "1")).unwrap();
        feed.send(notification("B", "2")).unwrap();

        eventually(|| toaster.shown.lock().unwrap().len() == 2).await;
        assert_eq!(toaster.shown.lock().unwrap()[1].0, "B \n 2");
        assert_eq!(mgr.state(), Connected);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn panicking_signal_handler_keeps_connection_alive() {
        let transport = ScriptedTransport::with(&[]);
        let bus = LocalBus::new();
        let _broken = bus.subscribe(Topic::NovaNotificacao, |_| panic!("ui handler bug"));
        let (mgr, toaster) = manager_with(
            SessionToken::new(Some("jwt")),
            transport.clone(),
            fast_policy(3),
            FakeDesktop::new(DesktopPermission::Denied, DesktopPermission::Denied),
            bus,
        );
        mgr.start().await;

        let feed = transport.take_feed(0);
        feed.send(notification("A", "1")).unwrap();
        eventually(|| toaster.shown.lock().unwrap().len() == 1).await;

        feed.send(notification("B", "2")).unwrap();
        eventually(|| toaster.shown.lock().unwrap().len() == 2).await;
        assert_eq!(mgr.state(), Connected);
        assert_eq!(transport.calls().len(), 1);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn silent_session_is_treated_as_dropped() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        let mgr = mgr.with_idle_timeout(Duration::from_millis(50));
        mgr.start().await;
        let mut transitions = mgr.subscribe_transitions();

        // feed 0 stays open but never yields, like a half-open socket
        assert_eq!(next(&mut transitions).await, t(Connected, Reconnecting));
        assert_eq!(next(&mut transitions).await, t(Reconnecting, Connected));
        assert_eq!(
            transport.calls(),
            vec![NegotiationMode::Direct, NegotiationMode::Direct]
        );
        mgr.stop().await;
    }

    #[tokio::test]
    async fn heartbeat_ticks_keep_the_session_alive() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        let mgr = mgr.with_idle_timeout(Duration::from_millis(150));
        mgr.start().await;
        let mut transitions = mgr.subscribe_transitions();

        let feed = transport.take_feed(0);
        for _ in 0..10 {
            feed.send(r#"{"type":"event","event":"tick","payload":{}}"#.into())
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        assert!(transitions.try_recv().is_err());
        assert_eq!(mgr.state(), Connected);
        assert_eq!(transport.calls().len(), 1);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn logout_before_reconnect_stops_reconnecting() {
        let transport = ScriptedTransport::with(&[]);
        let tokens = SessionToken::new(Some("jwt"));
        let (mgr, _) = manager_with(
            tokens.clone(),
            transport.clone(),
            fast_policy(3),
            FakeDesktop::new(DesktopPermission::Denied, DesktopPermission::Denied),
            LocalBus::new(),
        );
        mgr.start().await;
        let mut transitions = mgr.subscribe_transitions();

        tokens.clear();
        transport.drop_session(0);
        assert_eq!(next(&mut transitions).await, t(Connected, Reconnecting));
        assert_eq!(next(&mut transitions).await, t(Reconnecting, Disconnected));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.calls(), vec![NegotiationMode::Direct]);
        assert_eq!(mgr.state(), Disconnected);
    }

    #[tokio::test]
    async fn stop_closes_session_and_disconnects() {
        let transport = ScriptedTransport::with(&[]);
        let (mgr, _) = manager(Some("jwt"), transport.clone(), fast_policy(3));
        mgr.start().await;
        let feed = transport.take_feed(0);

        mgr.stop().await;
        assert_eq!(mgr.state(), Disconnected);
        assert!(feed.is_closed());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn backoff_doubles_and_caps_with_jitter() {
        let policy = ReconnectPolicy {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
            max_attempts: 8,
        };
        for (attempt, expected) in [(1, 1000u64), (2, 2000), (3, 4000), (5, 16_000)] {
            let ms = policy.delay_for(attempt).as_millis() as u64;
            assert!(
                ms >= expected * 9 / 10 && ms <= expected * 11 / 10,
                "attempt {attempt}: {ms}ms"
            );
        }
        for attempt in 6..=40 {
            let ms = policy.delay_for(attempt).as_millis() as u64;
            assert!((27_000..=30_000).contains(&ms), "attempt {attempt}: {ms}ms");
        }
    }

    #[test]
    fn default_policy_follows_config_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base, Duration::from_secs(1));
        assert_eq!(policy.max, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 8);
    }
}
