//! # Wirelink
//!
//! Client for a bidirectional message-based RPC protocol over one
//! persistent WebSocket.
//!
//! Either side may initiate. The client calls remote services by
//! `"service/action"` path and awaits the correlated reply; remote
//! services call back into methods and watchers the client registered.
//! The session logs in on every new transport and reconnects with linear
//! backoff when the transport drops.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wirelink::prelude::*;
//!
//! # async fn run() -> Result<(), WirelinkError> {
//! let client = Client::builder(SessionConfig {
//!     name: "reporting".into(),
//!     ..SessionConfig::default()
//! })
//! .build();
//!
//! client.register_method("ping", |request, responder| {
//!     tracing::debug!(id = %request.correlation_id, "ping");
//!     let _ = responder.reply(serde_json::json!({"status": 200}));
//! });
//!
//! client.connect().await?;
//! let reply = client.call("math/add", serde_json::json!({"a": 1, "b": 2})).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod driver;
mod error;
mod event;
mod http;

pub use client::{Client, ClientBuilder, Responder};
pub use error::WirelinkError;
pub use event::SessionEvent;
pub use http::ApiClient;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::{ApiClient, Client, ClientBuilder, Responder, SessionEvent, WirelinkError};
    pub use wirelink_protocol::{Envelope, Kind, ProtocolError, Route, Value};
    pub use wirelink_session::{ConnectionState, SessionConfig, SessionError, TokenProvider};
    pub use wirelink_transport::{ConnectRequest, Connection, Connector, Received, TransportError};
}
