//! Core protocol types for Wirelink's wire format.
//!
//! Every frame on the socket, in either direction, is one [`Envelope`]
//! serialized as a JSON object with single-letter keys:
//!
//! ```text
//! { "s": "math", "n": "add", "t": "call", "i": "3f9c…-7", "d": { … } }
//!    │            │          │            │               └ payload
//!    │            │          │            └ correlation id
//!    │            │          └ kind
//!    │            └ action
//!    └ service
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Kind: routing discipline
// ---------------------------------------------------------------------------

/// What an envelope is, which decides how the router looks up its handler.
///
/// `#[serde(rename_all = "lowercase")]` gives the wire tags `"call"`,
/// `"watch"` and `"callback"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// A request expecting exactly one reply.
    Call,
    /// A subscription-style request; replies may keep coming.
    Watch,
    /// A reply correlated to an earlier call or watch by id.
    Callback,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Call => "call",
            Self::Watch => "watch",
            Self::Callback => "callback",
        };
        f.write_str(tag)
    }
}

// ---------------------------------------------------------------------------
// Route: "service/action"
// ---------------------------------------------------------------------------

/// A parsed `service/action` path.
///
/// The first `/`-separated segment is the service; everything after the
/// first slash is the action, so `"fs/read/all"` routes to action
/// `"read/all"` on service `"fs"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Target service (namespace).
    pub service: String,
    /// Target method or watch name. May be empty.
    pub action: String,
}

impl Route {
    /// Builds a route from its two halves.
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
        }
    }

    /// Splits a path on its first `/`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidPath`] when the service segment is
    /// empty (`""`, `"/add"`).
    pub fn parse(path: &str) -> Result<Self, ProtocolError> {
        let (service, action) = path.split_once('/').unwrap_or((path, ""));
        if service.is_empty() {
            return Err(ProtocolError::InvalidPath(path.to_string()));
        }
        Ok(Self::new(service, action))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.action)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit exchanged over the wire.
///
/// `payload` stays an untyped [`Value`]: the protocol layer never
/// interprets it, except for the `status` convention on call replies
/// (handled by the session layer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Target service. Required on outbound calls and watches, echoed
    /// back on callbacks.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Target method or watch name. Empty for callbacks.
    #[serde(
        rename = "n",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub action: String,

    /// Routing discipline.
    #[serde(rename = "t")]
    pub kind: Kind,

    /// Correlation id linking a request to its reply.
    #[serde(rename = "i")]
    pub correlation_id: String,

    /// Kind-specific data.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Builds an outbound call or watch for `route`.
    pub fn request(
        kind: Kind,
        route: &Route,
        correlation_id: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            service: Some(route.service.clone()),
            action: route.action.clone(),
            kind,
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Builds a callback carrying `payload` for `correlation_id`.
    pub fn callback(
        service: Option<String>,
        correlation_id: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            service,
            action: String::new(),
            kind: Kind::Callback,
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Builds the callback answering this envelope: same id, same service.
    pub fn reply(&self, payload: Option<Value>) -> Self {
        Self::callback(self.service.clone(), self.correlation_id.clone(), payload)
    }

    /// The registry key this envelope is routed by: the correlation id for
    /// callbacks, the action for everything else.
    pub fn route_key(&self) -> &str {
        match self.kind {
            Kind::Callback => &self.correlation_id,
            Kind::Call | Kind::Watch => &self.action,
        }
    }
}

/// Some peers send `"n": null` on callbacks; treat it like a missing key.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// =========================================================================
// Tests
// =========================================================================
