//! The public session handle: [`Client`], its builder and [`Responder`].
//!
//! A `Client` is cheap to clone; every clone talks to the same driver
//! task. Dropping the last clone destroys the session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use wirelink_protocol::{Envelope, Kind, Route, Value};
use wirelink_session::{ConnectionState, NoTokenProvider, SessionConfig, TokenProvider};
use wirelink_transport::{Connector, WebSocketConnector};

use crate::WirelinkError;
use crate::driver::{Command, PendingCall, RemoteHandler, spawn_driver};
use crate::event::SessionEvent;

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`Client`].
///
/// Defaults to the WebSocket connector and no token provider. Both can be
/// swapped; the builder's type parameters change accordingly.
///
/// # Example
///
/// ```rust,no_run
/// use wirelink::prelude::*;
///
/// # async fn run() -> Result<(), WirelinkError> {
/// let config = SessionConfig {
///     name: "inventory".into(),
///     host: Some("rpc.internal".into()),
///     ..SessionConfig::default()
/// };
/// let client = Client::builder(config).build();
/// client.connect().await?;
/// let sum = client.call("math/add", serde_json::json!({"a": 1, "b": 2})).await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder<C = WebSocketConnector, P = NoTokenProvider> {
    config: SessionConfig,
    connector: C,
    tokens: P,
}

impl ClientBuilder {
    /// Creates a builder with the default connector and token provider.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            connector: WebSocketConnector,
            tokens: NoTokenProvider,
        }
    }
}

impl<C, P> ClientBuilder<C, P> {
    /// Uses `connector` to open transports.
    pub fn connector<C2: Connector>(self, connector: C2) -> ClientBuilder<C2, P> {
        ClientBuilder {
            config: self.config,
            connector,
            tokens: self.tokens,
        }
    }

    /// Asks `tokens` for a bearer token when the config carries none.
    pub fn token_provider<P2: TokenProvider>(self, tokens: P2) -> ClientBuilder<C, P2> {
        ClientBuilder {
            config: self.config,
            connector: self.connector,
            tokens,
        }
    }
}

impl<C: Connector, P: TokenProvider> ClientBuilder<C, P> {
    /// Spawns the session driver and returns a handle to it.
    ///
    /// The session starts [`Idle`](ConnectionState::Idle); nothing is
    /// dialed until [`Client::connect`]. Must be called from within a
    /// Tokio runtime.
    pub fn build(self) -> Client {
        let call_timeout = self.config.call_timeout();
        let handle = spawn_driver(self.config, self.connector, self.tokens);
        Client {
            commands: handle.commands,
            events: handle.events,
            state: handle.state,
            session_id: Arc::from(handle.session_id),
            call_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A handle to one client session.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Receiver<ConnectionState>,
    session_id: Arc<str>,
    call_timeout: Option<Duration>,
}

impl Client {
    /// Creates a builder for `config`.
    pub fn builder(config: SessionConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Resolves once the session is open.
    ///
    /// Starts a connection attempt if the session is idle; otherwise joins
    /// the attempt in progress (including a scheduled reconnect). Resolves
    /// after the `auth/login` reply arrives, with the reply's outcome: a
    /// rejected login is `Err(Session(RemoteFailure))` even though the
    /// session is open.
    ///
    /// # Errors
    /// - [`WirelinkError::ConnectionClosed`] if the transport closed and
    ///   auto-reconnect is off
    /// - [`WirelinkError::Destroyed`] if the session is destroyed first
    pub async fn connect(&self) -> Result<(), WirelinkError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Connect { reply })?;
        rx.await.map_err(|_| WirelinkError::Destroyed)?
    }

    /// Calls `path` (`"service/action"`) and waits for the reply.
    ///
    /// A reply with `status: 200` resolves to the payload without its
    /// `status` field; any other numeric status is
    /// [`RemoteFailure`](wirelink_session::SessionError::RemoteFailure).
    ///
    /// Without a configured call timeout, a call whose reply never comes
    /// (for instance because the session was destroyed) never resolves.
    ///
    /// # Errors
    /// - [`InvalidPath`](wirelink_protocol::ProtocolError::InvalidPath)
    ///   if the service segment is empty
    /// - [`WirelinkError::TransportUnavailable`] if not connected
    /// - [`WirelinkError::Timeout`] if the call timeout elapsed
    pub async fn call(
        &self,
        path: &str,
        data: impl Into<Option<Value>>,
    ) -> Result<Value, WirelinkError> {
        self.request(Kind::Call, path, data.into()).await
    }

    /// Starts a watch on `path`. Resolves with the first callback for it,
    /// settled the same way as [`call`](Self::call).
    pub async fn watch(
        &self,
        path: &str,
        data: impl Into<Option<Value>>,
    ) -> Result<Value, WirelinkError> {
        self.request(Kind::Watch, path, data.into()).await
    }

    /// Handles remote `call` envelopes whose action is `name`.
    ///
    /// Registering a name twice replaces the earlier handler.
    pub fn register_method<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Envelope, Responder) + Send + Sync + 'static,
    {
        self.register(name.into(), Kind::Call, Arc::new(handler));
    }

    /// Handles remote `watch` envelopes whose action is `name`.
    pub fn register_watcher<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Envelope, Responder) + Send + Sync + 'static,
    {
        self.register(name.into(), Kind::Watch, Arc::new(handler));
    }

    /// Sends a raw envelope over the current transport.
    ///
    /// # Errors
    /// [`WirelinkError::TransportUnavailable`] if not connected, or the
    /// transport's send error.
    pub async fn write(&self, envelope: Envelope) -> Result<(), WirelinkError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Write { envelope, reply })?;
        rx.await.map_err(|_| WirelinkError::Destroyed)?
    }

    /// Destroys the session: closes the transport, cancels any scheduled
    /// reconnect and fails waiting `connect()` calls. Idempotent.
    ///
    /// Pending calls are not settled.
    pub async fn destroy(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Destroy { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Subscribes to session events from this point on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Number of outbound calls and watches still waiting for a callback,
    /// including an in-flight login. Zero once the session is destroyed.
    pub async fn pending_calls(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.send_command(Command::Pending { reply }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// The random id prefixing every correlation id of this session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // -- internals --------------------------------------------------------

    fn send_command(&self, command: Command) -> Result<(), WirelinkError> {
        self.commands
            .send(command)
            .map_err(|_| WirelinkError::Destroyed)
    }

    fn register(&self, name: String, kind: Kind, handler: RemoteHandler) {
        if self
            .send_command(Command::Register {
                name,
                kind,
                handler,
            })
            .is_err()
        {
            tracing::debug!(%kind, "register on a destroyed session ignored");
        }
    }

    async fn request(
        &self,
        kind: Kind,
        path: &str,
        payload: Option<Value>,
    ) -> Result<Value, WirelinkError> {
        let route = Route::parse(path)?;
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Request {
            kind,
            route,
            payload,
            reply,
        })?;
        let pending = rx.await.map_err(|_| WirelinkError::Destroyed)??;

        let correlation_id = pending.correlation_id.clone();
        match self.call_timeout {
            None => settled(pending).await,
            Some(limit) => match tokio::time::timeout(limit, settled(pending)).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = self.send_command(Command::Forget { correlation_id });
                    Err(WirelinkError::Timeout(limit))
                }
            },
        }
    }
}

/// Waits for a pending call's callback.
///
/// If the registry dropped the entry without settling it (the session was
/// destroyed), the returned future never resolves.
fn settled(pending: PendingCall) -> impl Future<Output = Result<Value, WirelinkError>> + Send {
    async move {
        match pending.settled.await {
            Ok(result) => result.map_err(WirelinkError::from),
            Err(_) => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// Sends callbacks back for one remote-initiated call or watch.
///
/// Handed to every handler registered with
/// [`Client::register_method`] or [`Client::register_watcher`]. The
/// callback echoes the request's service and correlation id.
#[derive(Debug, Clone)]
pub struct Responder {
    service: Option<String>,
    correlation_id: String,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl Responder {
    pub(crate) fn new(request: &Envelope, outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            service: request.service.clone(),
            correlation_id: request.correlation_id.clone(),
            outbound,
        }
    }

    /// The correlation id being answered.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Queues a callback carrying `payload`.
    ///
    /// Watch handlers may reply more than once.
    ///
    /// # Errors
    /// [`WirelinkError::Destroyed`] if the session is gone.
    pub fn reply(&self, payload: impl Into<Option<Value>>) -> Result<(), WirelinkError> {
        let callback = Envelope::callback(
            self.service.clone(),
            self.correlation_id.clone(),
            payload.into(),
        );
        self.outbound
            .send(callback)
            .map_err(|_| WirelinkError::Destroyed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_responder_reply_echoes_service_and_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = Envelope::request(Kind::Call, &Route::new("peer", "ping"), "x-1", None);
        let responder = Responder::new(&request, tx);

        responder.reply(json!({"status": 200})).unwrap();

        let callback = rx.recv().await.unwrap();
        assert_eq!(callback.kind, Kind::Callback);
        assert_eq!(callback.service.as_deref(), Some("peer"));
        assert_eq!(callback.correlation_id, "x-1");
        assert_eq!(callback.payload, Some(json!({"status": 200})));
    }

    #[test]
    fn test_responder_reply_after_session_gone_is_destroyed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let request = Envelope::request(Kind::Watch, &Route::new("peer", "ticks"), "w", None);
        let responder = Responder::new(&request, tx);

        let result = responder.reply(None::<Value>);

        assert!(matches!(result, Err(WirelinkError::Destroyed)));
    }
}
