//! Error types for the session layer.

use serde_json::Number;
use wirelink_protocol::Kind;

/// Errors that can occur while registering, routing or settling calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The token collaborator could not produce a token.
    ///
    /// Never fatal to a connection attempt: see
    /// [`on_token_acquisition_failure`](crate::on_token_acquisition_failure).
    #[error("token unavailable: {0}")]
    TokenUnavailable(String),

    /// A well-formed envelope arrived but nothing is registered for it.
    /// For callbacks `name` is the correlation id.
    #[error("no {kind} handler registered for {name:?}")]
    NoHandler { kind: Kind, name: String },

    /// A one-shot entry with this correlation id is still pending.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(String),

    /// The remote side answered a call with a non-200 `status`.
    ///
    /// `status` is the number exactly as it appeared on the wire.
    #[error("remote call failed with status {status}: {reason}")]
    RemoteFailure { status: Number, reason: String },
}
