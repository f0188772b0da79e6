//! Integration tests for the WebSocket connector.
//!
//! These tests spin up a real WebSocket server on `127.0.0.1:0` and dial
//! it with [`WebSocketConnector`], so frames actually cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message;
    use wirelink_transport::{
        CLOSE_ABNORMAL, ConnectRequest, Connection, Connector, Received,
        TransportError, WebSocketConnector,
    };

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its URL.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}/socket"))
    }

    /// Accepts one upgrade, reporting the `Authorization` header it saw.
    async fn accept_one(
        listener: TcpListener,
        auth_tx: oneshot::Sender<Option<String>>,
    ) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        let callback = move |req: &Request, resp: Response| {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let _ = auth_tx.send(auth);
            Ok::<Response, ErrorResponse>(resp)
        };
        tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .expect("upgrade should succeed")
    }

    #[tokio::test]
    async fn test_connect_sends_bearer_token_and_exchanges_frames() {
        let (listener, url) = listen().await;
        let (auth_tx, auth_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, auth_tx));

        let conn = WebSocketConnector
            .connect(&ConnectRequest {
                url,
                token: "secret".into(),
            })
            .await
            .expect("should connect");
        let mut server_ws = server.await.expect("server task");

        assert_eq!(
            auth_rx.await.unwrap().as_deref(),
            Some("Bearer secret")
        );

        // Client -> server travels as a text frame.
        conn.send_text(r#"{"t":"call","i":"a-1"}"#.into())
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "frames must be text, got {msg:?}");
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"t":"call","i":"a-1"}"#);

        // Server -> client.
        server_ws
            .send(Message::text("hello"))
            .await
            .unwrap();
        let received = conn.recv().await.expect("recv should succeed");
        assert_eq!(received, Received::Frame(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_connect_empty_token_omits_authorization_header() {
        let (listener, url) = listen().await;
        let (auth_tx, auth_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, auth_tx));

        let _conn = WebSocketConnector
            .connect(&ConnectRequest {
                url,
                token: String::new(),
            })
            .await
            .expect("should connect");
        let _server_ws = server.await.unwrap();

        assert_eq!(auth_rx.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recv_reports_close_code_from_peer() {
        let (listener, url) = listen().await;
        let (auth_tx, _auth_rx) = oneshot::channel();
        let server = tokio::spawn(accept_one(listener, auth_tx));

        let conn = WebSocketConnector
            .connect(&ConnectRequest {
                url,
                token: String::new(),
            })
            .await
            .unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "bye".into(),
            }))
            .await
            .unwrap();

        let received = conn.recv().await.expect("recv should not error");
        assert_eq!(received, Received::Closed { code: 1001 });

        // Once closed, the connection stays closed.
        let again = conn.recv().await.expect("recv should not error");
        assert_eq!(
            again,
            Received::Closed {
                code: CLOSE_ABNORMAL
            }
        );
    }

    #[tokio::test]
    async fn test_connect_refused_returns_connect_failed() {
        // Bind then drop so the port is (almost certainly) closed.
        let (listener, url) = listen().await;
        drop(listener);

        let result = WebSocketConnector
            .connect(&ConnectRequest {
                url,
                token: String::new(),
            })
            .await;

        assert!(
            matches!(result, Err(TransportError::ConnectFailed { .. })),
            "expected ConnectFailed"
        );
    }

    #[tokio::test]
    async fn test_connect_malformed_url_returns_invalid_request() {
        let result = WebSocketConnector
            .connect(&ConnectRequest {
                url: "not a url".into(),
                token: String::new(),
            })
            .await;

        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }
}
