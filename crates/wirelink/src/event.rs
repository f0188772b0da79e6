//! Session lifecycle events.
//!
//! Events are fanned out on a `tokio::sync::broadcast` channel. Each
//! subscriber gets its own cursor; a subscriber that falls behind sees
//! `RecvError::Lagged` instead of slowing down frame routing.

use std::time::Duration;

use wirelink_protocol::Kind;

/// Capacity of the event channel. Older events are overwritten for
/// subscribers that lag this far behind.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The `auth/login` reply arrived; the session is open.
    Connected,

    /// The transport closed.
    Closed { code: u16 },

    /// A reconnect attempt is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },

    /// The transport reported an error or failed to open. The connection,
    /// if any, is kept.
    TransportError { message: String },

    /// A well-formed envelope arrived with no handler registered for it.
    /// For callbacks `name` is the correlation id.
    RoutingError { kind: Kind, name: String },

    /// The session was destroyed. No further events follow.
    Destroyed,
}
