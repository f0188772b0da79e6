//! Unified error type for the Wirelink client.

use std::time::Duration;

use wirelink_protocol::ProtocolError;
use wirelink_session::SessionError;
use wirelink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `wirelink` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each wrapping variant generates the `From` impls, so `?`
/// converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WirelinkError {
    /// A transport-level error (connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid path).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error. A call rejected by the remote side surfaces
    /// here as [`SessionError::RemoteFailure`].
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The HTTP API channel failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// A call or write was issued while no transport exists.
    #[error("no transport: the session is not connected")]
    TransportUnavailable,

    /// The transport closed and the session will not reconnect.
    #[error("connection closed with code {code}")]
    ConnectionClosed { code: u16 },

    /// The session has been destroyed.
    #[error("session destroyed")]
    Destroyed,

    /// A call did not settle within the configured call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl WirelinkError {
    /// The remote status code, if the remote side rejected a call with an
    /// integer status.
    pub fn remote_status(&self) -> Option<i64> {
        match self {
            Self::Session(SessionError::RemoteFailure { status, .. }) => status.as_i64(),
            _ => None,
        }
    }
}
