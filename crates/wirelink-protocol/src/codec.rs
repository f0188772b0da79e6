//! Codec trait, the JSON implementation, and the inbound-frame policy.
//!
//! A codec converts between Rust types and frames. The wire is text-only
//! (every envelope travels as a WebSocket text frame), so encoding yields
//! a `String`; decoding accepts raw bytes because the transport hands us
//! whatever the peer sent, text or binary.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Envelope, ProtocolError};

/// A codec that can encode Rust types to text frames and decode them back.
///
/// `Send + Sync + 'static` because the codec lives inside the session's
/// driver task for as long as the session exists.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`), the protocol's only
/// wire format.
///
/// ## Example
///
/// ```rust
/// use wirelink_protocol::{Codec, Envelope, JsonCodec, Kind, Route};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::request(Kind::Call, &Route::new("math", "add"), "s-1", None);
///
/// let frame = codec.encode(&envelope).unwrap();
/// assert_eq!(frame, r#"{"s":"math","n":"add","t":"call","i":"s-1"}"#);
///
/// let decoded: Envelope = codec.decode(frame.as_bytes()).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// Parses an inbound frame into an envelope.
///
/// Malformed frames are not errors as far as the session is concerned:
/// they go to [`on_decode_failure`] and this returns `None`.
pub fn decode_frame(codec: &impl Codec, data: &[u8]) -> Option<Envelope> {
    match codec.decode(data) {
        Ok(envelope) => Some(envelope),
        Err(error) => {
            on_decode_failure(&error, data);
            None
        }
    }
}

/// Policy for frames that don't decode: drop them.
///
/// The protocol is closed, so anything that isn't an envelope is noise.
/// It is logged at `trace` and never reaches the session's event stream
/// or any pending call.
pub fn on_decode_failure(error: &ProtocolError, data: &[u8]) {
    tracing::trace!(error = %error, len = data.len(), "dropping malformed frame");
}
