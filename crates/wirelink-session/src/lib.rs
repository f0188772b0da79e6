//! Session plumbing for Wirelink.
//!
//! This crate holds the parts of a client session that don't do I/O:
//!
//! 1. **Registries**: durable method/watcher handlers and one-shot call
//!    replies ([`HandlerRegistry`], [`CallRegistry`], [`settle`])
//! 2. **Routing**: frame in, handler out ([`route_frame`])
//! 3. **Tokens**: the [`TokenProvider`] seam to an identity service
//! 4. **Configuration and states**: [`SessionConfig`],
//!    [`ReconnectPolicy`], [`ConnectionState`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Client facade + driver (above)  ← owns the transport and the event loop
//!     ↕
//! Session layer (this crate)      ← decides who handles each envelope
//!     ↕
//! Protocol layer (below)          ← provides Envelope, Kind, Codec
//! ```

mod auth;
mod calls;
mod error;
mod registry;
mod router;
mod session;

pub use auth::{NoTokenProvider, TokenProvider, acquire_token, on_token_acquisition_failure};
pub use calls::{CallRegistry, settle};
pub use error::SessionError;
pub use registry::{Dispatched, HandlerRegistry, MethodHandler, ReplyHandler};
pub use router::{Routed, route_frame};
pub use session::{
    ConnectionState, DEFAULT_HOST, DEFAULT_PATH, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL_MS,
    ReconnectPolicy, SessionConfig,
};
