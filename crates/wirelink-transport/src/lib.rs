//! Transport abstraction layer for Wirelink.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the socket a client session talks through. The session layer never
//! touches `tokio-tungstenite` directly; it only sees text frames going
//! out and [`Received`] items coming in. Tests plug an in-memory
//! connector into the same seam.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`
//! - `native-tls`: enables `wss://` URLs (port 443)

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Close code reported when the peer vanished without a close frame.
///
/// Mirrors the WebSocket "abnormal closure" code (RFC 6455 §7.4.1), which
/// is never sent on the wire and only ever synthesized locally.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported when a close frame arrived without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Everything a connector needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Full URL, e.g. `ws://localhost:80/`.
    pub url: String,
    /// Bearer token sent in the `Authorization` header. May be empty,
    /// in which case the remote side decides whether to accept us.
    pub token: String,
}

/// One item read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A data frame (text or binary, as raw bytes).
    Frame(Vec<u8>),
    /// The connection is gone. `code` is the WebSocket close code, or
    /// [`CLOSE_ABNORMAL`] if the stream ended without a close frame.
    Closed { code: u16 },
}

/// Opens outbound connections.
///
/// The returned futures must be `Send` because the session layer runs
/// connection attempts on spawned Tokio tasks.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Establishes a connection. Resolves once the transport is open.
    fn connect(
        &self,
        request: &ConnectRequest,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single open connection that carries text frames out and raw frames in.
///
/// Sending and receiving must be usable concurrently: one task sits in
/// [`recv`](Connection::recv) for the whole connection lifetime while
/// another sends.
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame to the remote peer.
    fn send_text(
        &self,
        text: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next item from the remote peer.
    ///
    /// An `Err` is a transport-level fault; the caller may keep reading.
    /// After [`Received::Closed`] has been returned, further calls keep
    /// returning `Closed`.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Received, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
