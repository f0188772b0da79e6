//! The call registry: correlation ids and reply settlement.
//!
//! Every outbound call or watch gets an id of the form
//! `{session_id}-{n}`, where `n` is a per-session counter. The id is
//! registered as a one-shot entry in the [`HandlerRegistry`], so the
//! remote side's callback finds its way back to exactly one caller.

use rand::Rng;
use serde_json::Number;
use wirelink_protocol::{Envelope, Kind, Value};

use crate::SessionError;
use crate::registry::{Dispatched, HandlerRegistry, MethodHandler};

/// A [`HandlerRegistry`] that also hands out correlation ids.
#[derive(Debug)]
pub struct CallRegistry {
    handlers: HandlerRegistry,
    session_id: String,
    next_call: u64,
}

impl CallRegistry {
    /// Creates a registry whose ids are prefixed with `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            session_id: session_id.into(),
            next_call: 0,
        }
    }

    /// Creates a registry with a fresh random session id.
    pub fn with_random_session_id() -> Self {
        Self::new(generate_session_id())
    }

    /// The prefix of every id this registry allocates.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Allocates a correlation id and registers `callback` as its one-shot
    /// reply handler. Returns the id to put in the outbound envelope.
    pub fn allocate_call(
        &mut self,
        callback: impl FnOnce(Envelope) + Send + 'static,
    ) -> String {
        // The counter only repeats after wrapping, but an id still pending
        // from that far back is skipped rather than overwritten.
        let id = loop {
            self.next_call = self.next_call.wrapping_add(1);
            let id = format!("{}-{}", self.session_id, self.next_call);
            if !self.handlers.is_pending(&id) {
                break id;
            }
        };
        // Vacancy was checked above.
        let _ = self.handlers.register_one_shot(id.clone(), Box::new(callback));
        id
    }

    /// Drops the pending entry for `correlation_id` without settling it.
    pub fn cancel(&mut self, correlation_id: &str) -> bool {
        self.handlers.remove_one_shot(correlation_id)
    }

    /// Adds a durable entry. See [`HandlerRegistry::register`].
    pub fn register(&mut self, name: impl Into<String>, kind: Kind, handler: MethodHandler) {
        self.handlers.register(name, kind, handler);
    }

    /// Routes an inbound envelope. See [`HandlerRegistry::dispatch`].
    pub fn dispatch(&mut self, envelope: Envelope) -> Result<Dispatched, SessionError> {
        self.handlers.dispatch(envelope)
    }

    /// Number of calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.handlers.pending()
    }

    /// Read access to the underlying handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
}

/// Turns a callback payload into the caller's result.
///
/// - numeric `status` of 200 → `Ok(payload without "status")`
/// - any other numeric `status` → [`SessionError::RemoteFailure`]
/// - no numeric `status` → `Ok(payload)` unchanged (`null` if absent)
pub fn settle(payload: Option<Value>) -> Result<Value, SessionError> {
    let Some(Value::Object(mut fields)) = payload else {
        return Ok(payload.unwrap_or(Value::Null));
    };

    let status: Number = match fields.get("status") {
        Some(Value::Number(status)) => status.clone(),
        _ => return Ok(Value::Object(fields)),
    };

    if status.as_f64() == Some(200.0) {
        fields.remove("status");
        Ok(Value::Object(fields))
    } else {
        let reason = status_reason(&status).to_string();
        Err(SessionError::RemoteFailure { status, reason })
    }
}

/// Human-readable text for a remote status code.
fn status_reason(status: &Number) -> &'static str {
    match status.as_i64().unwrap_or_default() {
        400 => "bad request",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not found",
        408 => "request timeout",
        409 => "conflict",
        429 => "too many requests",
        500 => "internal server error",
        501 => "not implemented",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        _ => "remote error",
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Used as the session id, so ids from two sessions (or two runs of the
/// same program) never collide at the remote side.
fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
