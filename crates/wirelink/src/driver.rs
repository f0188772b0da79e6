//! The session driver: an isolated Tokio task that owns the connection.
//!
//! Each [`Client`](crate::Client) talks to exactly one driver through an
//! unbounded mpsc channel. The driver owns everything mutable about the
//! session (the transport, the call registry, the reconnect timer), so
//! there are no locks: inbound frames, outbound writes and handler
//! dispatch are serialized by the driver's `select!` loop.
//!
//! ```text
//!  Client ──Command──▶ ┌────────┐ ◀──Inbound── reader task (per transport)
//!                      │ Driver │ ◀──Inbound── connect task (per attempt)
//!  Responder ──Env───▶ └────────┘ ──watch──▶ ConnectionState
//!                          │      ──broadcast──▶ SessionEvent
//!                          ▼
//!                     Connection::send_text
//! ```
//!
//! Connection attempts carry a generation number. Close, fault and login
//! results tagged with an older generation are ignored; frames are routed
//! whatever their generation, so a reply that raced a disconnect still
//! settles its call.

use std::ops::ControlFlow;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wirelink_protocol::{Codec, Envelope, JsonCodec, Kind, Route, Value};
use wirelink_session::{
    CallRegistry, ConnectionState, MethodHandler, ReconnectPolicy, SessionConfig, SessionError,
    TokenProvider, acquire_token, route_frame, settle,
};
use wirelink_transport::{
    CLOSE_ABNORMAL, ConnectRequest, Connection, Connector, Received, TransportError,
};

use crate::WirelinkError;
use crate::client::Responder;
use crate::event::{EVENT_CAPACITY, SessionEvent};

/// Service of the login call sent on every new transport.
pub(crate) const LOGIN_SERVICE: &str = "auth";
/// Action of the login call sent on every new transport.
pub(crate) const LOGIN_ACTION: &str = "login";

/// A handler for remote-initiated calls and watches.
pub(crate) type RemoteHandler = Arc<dyn Fn(Envelope, Responder) + Send + Sync>;

/// Reply channel for operations that resolve to `()` or an error.
type Reply = oneshot::Sender<Result<(), WirelinkError>>;

/// A request that went out on the wire and is waiting for its callback.
pub(crate) struct PendingCall {
    pub(crate) correlation_id: String,
    pub(crate) settled: oneshot::Receiver<Result<Value, SessionError>>,
}

/// Operations the client handle can request from the driver.
pub(crate) enum Command {
    /// Resolve once the session is open (starting a connection if idle).
    Connect { reply: Reply },

    /// Send a call or watch and hand back its pending reply.
    Request {
        kind: Kind,
        route: Route,
        payload: Option<Value>,
        reply: oneshot::Sender<Result<PendingCall, WirelinkError>>,
    },

    /// Send a raw envelope.
    Write { envelope: Envelope, reply: Reply },

    /// Add a durable handler.
    Register {
        name: String,
        kind: Kind,
        handler: RemoteHandler,
    },

    /// Drop a pending call without settling it (its caller gave up).
    Forget { correlation_id: String },

    /// Report how many one-shot entries are waiting for a callback.
    Pending { reply: oneshot::Sender<usize> },

    /// Tear the session down for good.
    Destroy { reply: oneshot::Sender<()> },
}

/// Results flowing back into the driver from the tasks it spawned.
enum Inbound<T> {
    Opened {
        generation: u64,
        conn: T,
        token: String,
    },
    ConnectFailed {
        generation: u64,
        error: TransportError,
    },
    Frame {
        data: Vec<u8>,
    },
    Fault {
        generation: u64,
        error: TransportError,
    },
    Closed {
        generation: u64,
        code: u16,
    },
    LoginReply {
        generation: u64,
        outcome: Result<Value, SessionError>,
    },
}

/// What the client handle keeps from a spawned driver.
pub(crate) struct DriverHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) session_id: String,
}

/// Spawns the driver task for one session.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_driver<C, P>(config: SessionConfig, connector: C, tokens: P) -> DriverHandle
where
    C: Connector,
    P: TokenProvider,
{
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let calls = CallRegistry::with_random_session_id();
    let session_id = calls.session_id().to_string();

    let driver = Driver {
        policy: config.reconnect_policy(),
        config,
        connector: Arc::new(connector),
        tokens: Arc::new(tokens),
        codec: JsonCodec,
        calls,
        conn: None,
        reader: None,
        generation: 0,
        attempts: 0,
        token: None,
        login: None,
        waiters: Vec::new(),
        reconnect_at: None,
        state: state_tx,
        events: events.clone(),
        commands: commands_rx,
        inbound_tx,
        inbound_rx,
        outbound_tx,
        outbound_rx,
    };

    tokio::spawn(driver.run());

    DriverHandle {
        commands: commands_tx,
        state: state_rx,
        events,
        session_id,
    }
}

/// The driver's state. Runs inside a Tokio task.
struct Driver<C: Connector, P: TokenProvider> {
    config: SessionConfig,
    policy: ReconnectPolicy,
    connector: Arc<C>,
    tokens: Arc<P>,
    codec: JsonCodec,
    calls: CallRegistry,
    /// Present only while a transport is open.
    conn: Option<Arc<C::Connection>>,
    reader: Option<JoinHandle<()>>,
    generation: u64,
    /// Consecutive reconnect attempts since the last successful login.
    attempts: u32,
    /// Token obtained from the provider, reused on reconnect.
    token: Option<String>,
    /// Correlation id of the login call awaiting its reply.
    login: Option<String>,
    /// `connect()` calls waiting for the next login reply.
    waiters: Vec<Reply>,
    reconnect_at: Option<Instant>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    inbound_tx: mpsc::UnboundedSender<Inbound<C::Connection>>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound<C::Connection>>,
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    outbound_rx: mpsc::UnboundedReceiver<Envelope>,
}

impl<C: Connector, P: TokenProvider> Driver<C, P> {
    /// Runs the driver loop until the session is destroyed.
    async fn run(mut self) {
        let session_id = self.calls.session_id().to_string();
        tracing::info!(%session_id, name = %self.config.name, "session driver started");

        loop {
            let deadline = self.reconnect_at;
            tokio::select! {
                command = self.commands.recv() => {
                    let flow = match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            tracing::debug!(%session_id, "all client handles dropped");
                            self.destroy().await;
                            ControlFlow::Break(())
                        }
                    };
                    if flow.is_break() {
                        break;
                    }
                }
                Some(inbound) = self.inbound_rx.recv() => {
                    self.handle_inbound(inbound).await;
                }
                Some(envelope) = self.outbound_rx.recv() => {
                    if let Err(e) = self.send(&envelope).await {
                        tracing::warn!(
                            id = %envelope.correlation_id,
                            error = %e,
                            "dropping outbound reply"
                        );
                    }
                }
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.reconnect_at = None;
                    self.start_connect();
                }
            }
        }

        tracing::info!(%session_id, "session driver stopped");
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Request {
                kind,
                route,
                payload,
                reply,
            } => {
                let result = self.request(kind, &route, payload).await;
                let _ = reply.send(result);
            }
            Command::Write { envelope, reply } => {
                let result = self.send(&envelope).await;
                let _ = reply.send(result);
            }
            Command::Register {
                name,
                kind,
                handler,
            } => self.register(name, kind, handler),
            Command::Forget { correlation_id } => {
                if self.calls.cancel(&correlation_id) {
                    tracing::debug!(id = %correlation_id, "forgot pending call");
                }
            }
            Command::Pending { reply } => {
                let _ = reply.send(self.calls.pending());
            }
            Command::Destroy { reply } => {
                self.destroy().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn connect(&mut self, reply: Reply) {
        let state = *self.state.borrow();
        match state {
            ConnectionState::Open => {
                let _ = reply.send(Ok(()));
            }
            ConnectionState::Idle => {
                self.waiters.push(reply);
                self.start_connect();
            }
            ConnectionState::Destroyed => {
                let _ = reply.send(Err(WirelinkError::Destroyed));
            }
            // An attempt is already under way (or scheduled); wait for it.
            ConnectionState::Connecting
            | ConnectionState::Authenticating
            | ConnectionState::Closing
            | ConnectionState::Reconnecting { .. } => self.waiters.push(reply),
        }
    }

    async fn request(
        &mut self,
        kind: Kind,
        route: &Route,
        payload: Option<Value>,
    ) -> Result<PendingCall, WirelinkError> {
        if self.conn.is_none() {
            return Err(WirelinkError::TransportUnavailable);
        }

        let (tx, settled) = oneshot::channel();
        let correlation_id = self.calls.allocate_call(move |reply| {
            let _ = tx.send(settle(reply.payload));
        });
        let envelope = Envelope::request(kind, route, correlation_id.clone(), payload);
        tracing::debug!(%kind, %route, id = %correlation_id, "sending request");

        if let Err(e) = self.send(&envelope).await {
            self.calls.cancel(&correlation_id);
            return Err(e);
        }
        Ok(PendingCall {
            correlation_id,
            settled,
        })
    }

    fn register(&mut self, name: String, kind: Kind, handler: RemoteHandler) {
        tracing::debug!(%kind, %name, "registering handler");
        let outbound = self.outbound_tx.clone();
        let method: MethodHandler = Arc::new(move |envelope: Envelope| {
            let responder = Responder::new(&envelope, outbound.clone());
            handler(envelope, responder);
        });
        self.calls.register(name, kind, method);
    }

    async fn destroy(&mut self) {
        self.reconnect_at = None;
        self.set_state(ConnectionState::Destroyed);
        self.cancel_login();

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(conn_id = %conn.id(), error = %e, "close on destroy failed");
            }
        }

        self.resolve_waiters(|| Err(WirelinkError::Destroyed));
        tracing::info!(pending = self.calls.pending(), "session destroyed");
        self.emit(SessionEvent::Destroyed);
    }

    // -----------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------

    /// Starts a new connection attempt on its own task.
    fn start_connect(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);

        let url = self.config.ws_url();
        tracing::info!(%url, generation, "connecting");

        let connector = Arc::clone(&self.connector);
        let tokens = Arc::clone(&self.tokens);
        let known_token = self.config.token.clone().or_else(|| self.token.clone());
        let account = self.config.account.clone();
        let inbound = self.inbound_tx.clone();

        tokio::spawn(async move {
            let token = match known_token {
                Some(token) => token,
                None => acquire_token(tokens.as_ref(), account.as_deref()).await,
            };
            let request = ConnectRequest { url, token };
            let result = match connector.connect(&request).await {
                Ok(conn) => Inbound::Opened {
                    generation,
                    conn,
                    token: request.token,
                },
                Err(error) => Inbound::ConnectFailed { generation, error },
            };
            let _ = inbound.send(result);
        });
    }

    async fn handle_inbound(&mut self, inbound: Inbound<C::Connection>) {
        match inbound {
            Inbound::Frame { data } => self.route(&data),
            Inbound::Opened {
                generation,
                conn,
                token,
            } => {
                if generation == self.generation {
                    self.on_opened(conn, token).await;
                } else {
                    tracing::debug!(generation, "closing superseded connection");
                    tokio::spawn(async move {
                        let _ = conn.close().await;
                    });
                }
            }
            Inbound::ConnectFailed { generation, error } if generation == self.generation => {
                tracing::warn!(error = %error, "connection attempt failed");
                self.emit(SessionEvent::TransportError {
                    message: error.to_string(),
                });
                self.on_closed(CLOSE_ABNORMAL);
            }
            Inbound::Fault { generation, error } if generation == self.generation => {
                tracing::warn!(error = %error, "transport error");
                self.emit(SessionEvent::TransportError {
                    message: error.to_string(),
                });
            }
            Inbound::Closed { generation, code } if generation == self.generation => {
                self.on_closed(code);
            }
            Inbound::LoginReply {
                generation,
                outcome,
            } if generation == self.generation => self.on_login(outcome),
            Inbound::ConnectFailed { generation, .. }
            | Inbound::Fault { generation, .. }
            | Inbound::Closed { generation, .. }
            | Inbound::LoginReply { generation, .. } => {
                tracing::debug!(generation, current = self.generation, "ignoring stale event");
            }
        }
    }

    /// Transport is up: start reading and send the login call.
    async fn on_opened(&mut self, conn: C::Connection, token: String) {
        if self.config.token.is_none() && !token.is_empty() {
            self.token = Some(token);
        }

        let conn = Arc::new(conn);
        tracing::info!(conn_id = %conn.id(), "transport open, logging in");
        self.reader = Some(spawn_reader(
            Arc::clone(&conn),
            self.generation,
            self.inbound_tx.clone(),
        ));
        self.conn = Some(conn);
        self.set_state(ConnectionState::Authenticating);

        let generation = self.generation;
        let inbound = self.inbound_tx.clone();
        let id = self.calls.allocate_call(move |reply| {
            let _ = inbound.send(Inbound::LoginReply {
                generation,
                outcome: settle(reply.payload),
            });
        });
        let login = Envelope::request(
            Kind::Call,
            &Route::new(LOGIN_SERVICE, LOGIN_ACTION),
            id.clone(),
            Some(json!({ "name": self.config.name })),
        );

        self.login = Some(id);

        // A failed send here means the transport is already going away;
        // the reader reports the close.
        if let Err(e) = self.send(&login).await {
            self.cancel_login();
            tracing::warn!(error = %e, "failed to send login");
            self.emit(SessionEvent::TransportError {
                message: e.to_string(),
            });
        }
    }

    /// A login reply only opens the session if its transport is still the
    /// live one. A reply queued behind a close for the same transport is
    /// dropped here.
    fn on_login(&mut self, outcome: Result<Value, SessionError>) {
        self.login = None;
        let state = *self.state.borrow();
        if state != ConnectionState::Authenticating || self.conn.is_none() {
            tracing::debug!(%state, "ignoring login reply for a closed transport");
            return;
        }

        self.attempts = 0;
        self.set_state(ConnectionState::Open);
        match &outcome {
            Ok(_) => tracing::info!(name = %self.config.name, "logged in"),
            Err(e) => tracing::warn!(error = %e, "login rejected"),
        }
        self.emit(SessionEvent::Connected);

        let result = outcome.map(|_| ());
        self.resolve_waiters(|| result.clone().map_err(WirelinkError::from));
    }

    fn on_closed(&mut self, code: u16) {
        self.conn = None;
        self.reader = None;
        self.cancel_login();
        self.set_state(ConnectionState::Closing);
        tracing::info!(code, "transport closed");
        self.emit(SessionEvent::Closed { code });

        if !self.config.auto_reconnect {
            self.set_state(ConnectionState::Idle);
            self.resolve_waiters(|| Err(WirelinkError::ConnectionClosed { code }));
            return;
        }

        self.attempts = self.attempts.saturating_add(1);
        let attempt = self.attempts;
        let delay = self.policy.delay(attempt);
        self.set_state(ConnectionState::Reconnecting { attempt });
        tracing::info!(attempt, ?delay, "scheduling reconnect");
        self.emit(SessionEvent::Reconnecting { attempt, delay });

        self.reconnect_at = Instant::now().checked_add(delay);
        if self.reconnect_at.is_none() {
            tracing::warn!(attempt, "reconnect delay out of range, not reconnecting");
        }
    }

    // -----------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------

    fn route(&mut self, data: &[u8]) {
        match route_frame(&self.codec, &mut self.calls, data) {
            Ok(_) => {}
            Err(SessionError::NoHandler { kind, name }) => {
                tracing::debug!(%kind, %name, "no handler for envelope");
                self.emit(SessionEvent::RoutingError { kind, name });
            }
            Err(e) => tracing::warn!(error = %e, "routing failed"),
        }
    }

    /// Encodes `envelope` and sends it over the current transport.
    async fn send(&mut self, envelope: &Envelope) -> Result<(), WirelinkError> {
        let conn = self
            .conn
            .clone()
            .ok_or(WirelinkError::TransportUnavailable)?;
        let text = self.codec.encode(envelope)?;
        conn.send_text(text).await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "state changed");
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Drops the login call's entry if its reply never came.
    fn cancel_login(&mut self) {
        let Some(id) = self.login.take() else {
            return;
        };
        if self.calls.cancel(&id) {
            tracing::debug!(%id, "login abandoned before its reply");
        }
    }

    fn resolve_waiters(&mut self, outcome: impl Fn() -> Result<(), WirelinkError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome());
        }
    }
}

/// Forwards everything a connection receives into the driver.
///
/// Stops after the connection reports `Closed` or the driver is gone.
fn spawn_reader<T: Connection>(
    conn: Arc<T>,
    generation: u64,
    inbound: mpsc::UnboundedSender<Inbound<T>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let item = match conn.recv().await {
                Ok(Received::Frame(data)) => Inbound::Frame { data },
                Ok(Received::Closed { code }) => {
                    let _ = inbound.send(Inbound::Closed { generation, code });
                    break;
                }
                Err(error) => Inbound::Fault { generation, error },
            };
            if inbound.send(item).is_err() {
                break;
            }
        }
        tracing::debug!(conn_id = %conn.id(), "reader stopped");
    })
}
