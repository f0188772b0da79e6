//! WebSocket connector implementation using `tokio-tungstenite`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, ConnectRequest, Connection, ConnectionId,
    Connector, Received, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`Connector`] that dials WebSocket servers.
///
/// Stateless: every call to [`connect`](Connector::connect) performs a
/// fresh TCP connect and HTTP upgrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Self::Connection, TransportError> {
        let mut upgrade = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        // An empty token means "let the server decide", so we send no
        // header at all rather than a dangling `Bearer `.
        if !request.token.is_empty() {
            let value = HeaderValue::from_str(&format!(
                "Bearer {}",
                request.token
            ))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            upgrade.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(upgrade)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                url: request.url.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ),
            })?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, url = %request.url, "WebSocket connection open");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            finished: AtomicBool::new(false),
        })
    }
}

/// A single client-side WebSocket connection.
///
/// The socket is split so that a reader parked in [`recv`](Connection::recv)
/// never blocks a concurrent [`send_text`](Connection::send_text).
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    /// Set once the stream has ended or failed. Later `recv` calls
    /// report an abnormal close instead of polling the stream again.
    finished: AtomicBool,
}

impl Connection for WebSocketConnection {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        if self.finished.load(Ordering::Acquire) {
            return Ok(Received::Closed {
                code: CLOSE_ABNORMAL,
            });
        }

        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Received::Frame(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Received::Frame(data.into()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(CLOSE_NO_STATUS);
                    self.finished.store(true, Ordering::Release);
                    return Ok(Received::Closed { code });
                }
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    self.finished.store(true, Ordering::Release);
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
                None => {
                    self.finished.store(true, Ordering::Release);
                    return Ok(Received::Closed {
                        code: CLOSE_ABNORMAL,
                    });
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
