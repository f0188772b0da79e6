//! The handler registry: who gets each inbound envelope.
//!
//! Two maps, two lifetimes:
//!
//! ```text
//! durable:   (Kind, name)    → MethodHandler   lives as long as the session
//! one-shot:  correlation id  → ReplyHandler    removed on first dispatch
//! ```
//!
//! Calls and watches coming from the remote side are looked up by
//! `(kind, action)` among the durable entries. Callbacks are looked up by
//! correlation id, one-shot entries first.
//!
//! # Concurrency note
//!
//! `HandlerRegistry` is a plain struct behind `&mut self`. It is owned by
//! the session's driver task, which serializes every dispatch, so a
//! one-shot entry can never be taken twice.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use wirelink_protocol::{Envelope, Kind};

use crate::SessionError;

/// A durable handler. Shared (`Arc`) so it can be invoked without holding
/// a borrow of the registry.
pub type MethodHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// A one-shot handler. `FnOnce` makes "invoked at most once" a property
/// of the type.
pub type ReplyHandler = Box<dyn FnOnce(Envelope) + Send>;

/// Which kind of entry a successful dispatch hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A durable entry; it is still registered.
    Durable,
    /// A one-shot entry; it has been removed.
    OneShot,
}

/// Maps inbound envelopes to local handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    durable: HashMap<(Kind, String), MethodHandler>,
    one_shot: HashMap<String, ReplyHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a durable entry for `(kind, name)`.
    ///
    /// Registering the same pair twice replaces the earlier handler.
    pub fn register(&mut self, name: impl Into<String>, kind: Kind, handler: MethodHandler) {
        let name = name.into();
        if self.durable.insert((kind, name.clone()), handler).is_some() {
            tracing::warn!(%kind, %name, "replaced existing handler");
        }
    }

    /// Adds a one-shot entry for a pending reply.
    ///
    /// # Errors
    /// Returns [`SessionError::DuplicateCorrelationId`] if an entry with
    /// this id is still pending; the existing entry is left untouched.
    pub fn register_one_shot(
        &mut self,
        correlation_id: impl Into<String>,
        handler: ReplyHandler,
    ) -> Result<(), SessionError> {
        match self.one_shot.entry(correlation_id.into()) {
            Entry::Occupied(entry) => {
                Err(SessionError::DuplicateCorrelationId(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Removes a pending one-shot entry without invoking it.
    ///
    /// Returns `false` if nothing was pending under that id.
    pub fn remove_one_shot(&mut self, correlation_id: &str) -> bool {
        self.one_shot.remove(correlation_id).is_some()
    }

    /// Whether a one-shot entry is pending under `correlation_id`.
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.one_shot.contains_key(correlation_id)
    }

    /// Routes `envelope` to its handler and invokes it once.
    ///
    /// A matched one-shot entry is removed before its handler runs.
    ///
    /// # Errors
    /// Returns [`SessionError::NoHandler`] when nothing matches; no handler
    /// is invoked in that case.
    pub fn dispatch(&mut self, envelope: Envelope) -> Result<Dispatched, SessionError> {
        if envelope.kind == Kind::Callback {
            if let Some(handler) = self.one_shot.remove(&envelope.correlation_id) {
                handler(envelope);
                return Ok(Dispatched::OneShot);
            }
        }

        let key = (envelope.kind, envelope.route_key().to_string());
        match self.durable.get(&key) {
            Some(handler) => {
                let handler = Arc::clone(handler);
                handler(envelope);
                Ok(Dispatched::Durable)
            }
            None => {
                let (kind, name) = key;
                Err(SessionError::NoHandler { kind, name })
            }
        }
    }

    /// Number of pending one-shot entries.
    pub fn pending(&self) -> usize {
        self.one_shot.len()
    }

    /// Number of durable entries.
    pub fn durable(&self) -> usize {
        self.durable.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("durable", &self.durable.keys().collect::<Vec<_>>())
            .field("pending", &self.one_shot.len())
            .finish()
    }
}
