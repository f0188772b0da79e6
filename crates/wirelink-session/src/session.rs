//! Session configuration and the connection state machine's states.
//!
//! Nothing here does I/O. The driver in the `wirelink` crate owns the
//! transport and moves through [`ConnectionState`]; this module only
//! describes where it can be and how long it waits between attempts.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Host used when [`SessionConfig::host`] is unset.
pub const DEFAULT_HOST: &str = "localhost";
/// Port used when [`SessionConfig::port`] is unset.
pub const DEFAULT_PORT: u16 = 80;
/// Path used when [`SessionConfig::path`] is unset.
pub const DEFAULT_PATH: &str = "/";
/// Base reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 2_000;
/// The only port that selects the secure schemes (`wss`, `https`).
const SECURE_PORT: u16 = 443;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for one client session.
///
/// Every field has a default, so a config can be built with
/// `SessionConfig { name: "svc".into(), ..Default::default() }` or
/// deserialized from a partial JSON object using the protocol's camelCase
/// option names (`autoReconnect`, `reconnectInterval`, …).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Session identity sent in the `auth/login` call.
    pub name: String,

    /// Remote host. Default: [`DEFAULT_HOST`].
    pub host: Option<String>,

    /// Remote port. Default: [`DEFAULT_PORT`]. Port 443 selects `wss`.
    pub port: Option<u16>,

    /// WebSocket path. Default: [`DEFAULT_PATH`].
    pub path: Option<String>,

    /// Bearer token. When unset, the token provider is asked on connect.
    pub token: Option<String>,

    /// Account name handed to the token provider.
    pub account: Option<String>,

    /// Reconnect after the transport closes. Default: `true`.
    pub auto_reconnect: bool,

    /// Base reconnect delay in milliseconds. Default: 2000.
    #[serde(rename = "reconnectInterval")]
    pub reconnect_interval_ms: u64,

    /// Factor applied to every reconnect delay. Default: 1.0.
    pub reconnect_interval_multiplier: f64,

    /// Give up on a pending call after this many milliseconds.
    ///
    /// Default: `None`, meaning a call whose reply never arrives (for
    /// instance because the session was destroyed) stays pending forever.
    #[serde(rename = "callTimeout")]
    pub call_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "wirelink".to_string(),
            host: None,
            port: None,
            path: None,
            token: None,
            account: None,
            auto_reconnect: true,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            reconnect_interval_multiplier: 1.0,
            call_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    /// The configured host, or [`DEFAULT_HOST`].
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    /// The configured port, or [`DEFAULT_PORT`].
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// The configured path, or [`DEFAULT_PATH`].
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_PATH)
    }

    /// `{ws|wss}://{host}:{port}{path}`.
    pub fn ws_url(&self) -> String {
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let path = self.path();
        let slash = if path.starts_with('/') { "" } else { "/" };
        format!("{scheme}://{}:{}{slash}{path}", self.host(), self.port())
    }

    /// `{http|https}://{host}:{port}`, the base of the HTTP API channel.
    pub fn http_url(&self) -> String {
        let scheme = if self.is_secure() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host(), self.port())
    }

    /// The reconnect schedule described by this config.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_interval_ms),
            self.reconnect_interval_multiplier,
        )
    }

    /// The per-call timeout, if one is configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    fn is_secure(&self) -> bool {
        self.port() == SECURE_PORT
    }
}

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Linear reconnect backoff.
///
/// The k-th consecutive attempt (k ≥ 1) waits `k × base × multiplier`.
/// There is no cap and no jitter: a client talks to one known endpoint,
/// and a successful login resets k.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    base: Duration,
    multiplier: f64,
}

impl ReconnectPolicy {
    /// Creates a policy. A negative or non-finite multiplier falls back
    /// to 1.0.
    pub fn new(base: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 0.0 {
            multiplier
        } else {
            tracing::warn!(
                multiplier,
                "invalid reconnect interval multiplier, using 1.0"
            );
            1.0
        };
        Self { base, multiplier }
    }

    /// Delay before attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.base.as_secs_f64() * f64::from(attempt) * self.multiplier;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where a session's connection currently is.
///
/// ```text
///  Idle ─connect()→ Connecting ─open→ Authenticating ─login reply→ Open
///   ↑                  ↑                    │                       │
///   │ (no auto-        │ timer              └──────── close ────────┤
///   │  reconnect)      │                                            ▼
///   └──────────── Reconnecting(n) ←─── auto-reconnect ──────── Closing
///
///  any state ─destroy()→ Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and no attempt in flight.
    Idle,
    /// Acquiring a token and dialing the transport.
    Connecting,
    /// Transport open, `auth/login` sent, reply not yet received.
    Authenticating,
    /// Logged in.
    Open,
    /// Transport just closed; deciding whether to reconnect.
    Closing,
    /// Waiting out the backoff before attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Terminal. No transitions leave this state.
    Destroyed,
}

impl ConnectionState {
    /// Whether a transport exists that writes can go through.
    pub fn has_transport(&self) -> bool {
        matches!(self, Self::Authenticating | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Open => f.write_str("open"),
            Self::Closing => f.write_str("closing"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting({attempt})"),
            Self::Destroyed => f.write_str("destroyed"),
        }
    }
}
