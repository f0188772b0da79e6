//! The HTTP API channel.
//!
//! Some services expose plain HTTP endpoints next to the WebSocket. The
//! [`ApiClient`] talks to them with the same host, port and bearer token
//! as the session, but it is otherwise independent: no routing, no
//! reconnects.
//!
//! Port 443 selects `https`, which needs the `native-tls` feature.

use serde::Serialize;
use serde::de::DeserializeOwned;
use wirelink_session::SessionConfig;

use crate::WirelinkError;

/// JSON-over-HTTP client for `{http|https}://{host}:{port}`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Creates a client for the endpoint described by `config`, using its
    /// token if one is configured.
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Like [`new`](Self::new) but reuses an existing `reqwest` client.
    pub fn with_client(config: &SessionConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: config.http_url(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        }
    }

    /// Replaces the bearer token. An empty token disables the header.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// The absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{path}", self.base_url)
    }

    /// `GET {path}` and decode the JSON body.
    ///
    /// # Errors
    /// [`WirelinkError::Http`] on connection failures, non-2xx statuses
    /// and undecodable bodies.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, WirelinkError> {
        let request = self.authorize(self.http.get(self.url(path)));
        tracing::debug!(path, "GET");
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// `POST {path}` with a JSON body and decode the JSON response.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, WirelinkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.http.post(self.url(path)).json(body));
        tracing::debug!(path, "POST");
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}
