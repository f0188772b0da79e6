//! Error types for the protocol layer.
//!
//! Each Wirelink crate defines its own error enum. A `ProtocolError` means
//! the problem is in turning envelopes into frames (or back), not in the
//! socket underneath or the session on top.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning an envelope into a frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a frame into an envelope).
    ///
    /// Common causes: malformed JSON, a missing `t` or `i` field, or an
    /// unknown kind tag.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A `service/action` path could not be split into a route.
    #[error("invalid path {0:?}: expected \"service/action\"")]
    InvalidPath(String),
}
