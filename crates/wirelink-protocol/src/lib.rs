//! Wire protocol for Wirelink.
//!
//! This crate defines what travels on the socket:
//!
//! - **Types** ([`Envelope`], [`Kind`], [`Route`]): the message
//!   structures and the `service/action` addressing scheme.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become
//!   text frames, plus [`decode_frame`] which applies the
//!   drop-on-failure policy to inbound frames.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Session (registry, router)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec, decode_frame, on_decode_failure};
pub use error::ProtocolError;
pub use types::{Envelope, Kind, Route};

/// Re-exported so downstream crates name payloads without importing
/// `serde_json` themselves.
pub use serde_json::Value;
