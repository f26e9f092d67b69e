//! [`WebSocketTransport`] against a local tokio-tungstenite server.

use transport_core::error::TransportError;
use transport_core::transport::{SocketListener, Transport, WebSocketTransport};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};
use url::Url;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Callback {
    Open,
    Message(String),
    Closed(u16, String),
    Failure(TransportError),
}

struct RecordingListener {
    tx: mpsc::UnboundedSender<Callback>,
}

impl SocketListener for RecordingListener {
    fn on_open(&self) {
        let _ = self.tx.send(Callback::Open);
    }

    fn on_message(&self, text: String) {
        let _ = self.tx.send(Callback::Message(text));
    }

    fn on_closed(&self, code: u16, reason: String) {
        let _ = self.tx.send(Callback::Closed(code, reason));
    }

    fn on_failure(&self, error: TransportError) {
        let _ = self.tx.send(Callback::Failure(error));
    }
}

fn recording_listener() -> (Arc<RecordingListener>, mpsc::UnboundedReceiver<Callback>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingListener { tx }), rx)
}

async fn next_callback(rx: &mut mpsc::UnboundedReceiver<Callback>) -> Callback {
    tokio::time::timeout(CALLBACK_TIMEOUT, rx.recv())
        .await
        .expect("Timed out waiting for callback")
        .expect("Listener channel closed")
}

/// Accept one WebSocket client and hand it to `handler`.
async fn start_server<F, Fut>(handler: F) -> Url
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let port = listener.local_addr().expect("local addr").port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = accept_async(stream).await.expect("handshake");
        handler(ws).await;
    });

    Url::parse(&format!("ws://127.0.0.1:{port}/v1")).unwrap()
}

async fn echo(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(message)) = ws.next().await {
        if message.is_text() && ws.send(message).await.is_err() {
            return;
        }
    }
}

/// **VALUE**: Text frames flow both ways once the socket opens.
///
/// **BUG THIS CATCHES**: Would catch on_open firing before the handshake, or
/// frames sent as binary so the server never sees them as text.
#[tokio::test]
async fn given_echo_server_when_text_sent_then_echo_arrives_on_listener() {
    // GIVEN: An echo server and an opened transport
    let url = start_server(echo).await;
    let transport = WebSocketTransport::new();
    let (listener, mut rx) = recording_listener();
    transport.open(&url, listener).unwrap();
    assert!(matches!(next_callback(&mut rx).await, Callback::Open));

    // WHEN: Sending a frame
    transport.send("hello".to_string()).unwrap();

    // THEN: The echo arrives as a message callback
    match next_callback(&mut rx).await {
        Callback::Message(text) => assert_eq!(text, "hello"),
        other => panic!("expected message, got {other:?}"),
    }
}

/// **VALUE**: A client-initiated close reports the confirmed code and reason.
#[tokio::test]
async fn given_open_socket_when_closed_by_client_then_on_closed_reports_code() {
    // GIVEN: An open socket
    let url = start_server(echo).await;
    let transport = WebSocketTransport::new();
    let (listener, mut rx) = recording_listener();
    transport.open(&url, listener).unwrap();
    assert!(matches!(next_callback(&mut rx).await, Callback::Open));

    // WHEN: Closing from our side
    transport.close(1000, "bye").unwrap();

    // THEN: The peer's confirmation comes back with the same code
    match next_callback(&mut rx).await {
        Callback::Closed(code, reason) => {
            assert_eq!(code, 1000);
            assert_eq!(reason, "bye");
        }
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn given_open_socket_when_server_closes_then_on_closed_reports_server_code() {
    let url = start_server(|mut ws| async move {
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "going away".into(),
            }))
            .await;
        while ws.next().await.is_some() {}
    })
    .await;
    let transport = WebSocketTransport::new();
    let (listener, mut rx) = recording_listener();
    transport.open(&url, listener).unwrap();
    assert!(matches!(next_callback(&mut rx).await, Callback::Open));

    match next_callback(&mut rx).await {
        Callback::Closed(code, reason) => {
            assert_eq!(code, 1001);
            assert_eq!(reason, "going away");
        }
        other => panic!("expected close, got {other:?}"),
    }
}

/// **VALUE**: A refused connection is reported through on_failure, never
/// as an `Err` from `open`.
///
/// **WHY THIS MATTERS**: The session only reconnects on failures it hears
/// about through the listener.
#[tokio::test]
async fn given_nothing_listening_when_opened_then_on_failure_with_websocket_error() {
    // GIVEN: A port with no server
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);
    let url = Url::parse(&format!("ws://127.0.0.1:{port}/v1")).unwrap();

    // WHEN: Opening
    let transport = WebSocketTransport::new();
    let (listener, mut rx) = recording_listener();
    let opened = transport.open(&url, listener);

    // THEN: open succeeds, the failure arrives on the listener
    assert!(opened.is_ok());
    match next_callback(&mut rx).await {
        Callback::Failure(error) => assert!(error.error_code().is_recoverable()),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn given_unopened_transport_when_sending_then_not_connected() {
    let transport = WebSocketTransport::new();

    let result = transport.send("hello".to_string());

    assert!(matches!(result, Err(TransportError::NotConnected { .. })));
}

/// **VALUE**: Opening again replaces the old connection without callbacks
/// from it.
#[tokio::test]
async fn given_open_socket_when_reopened_then_old_connection_is_silent() {
    // GIVEN: Two servers and a transport connected to the first
    let first = start_server(echo).await;
    let second = start_server(echo).await;
    let transport = WebSocketTransport::new();
    let (old_listener, mut old_rx) = recording_listener();
    transport.open(&first, old_listener).unwrap();
    assert!(matches!(next_callback(&mut old_rx).await, Callback::Open));

    // WHEN: Opening the second
    let (new_listener, mut new_rx) = recording_listener();
    transport.open(&second, new_listener).unwrap();
    assert!(matches!(next_callback(&mut new_rx).await, Callback::Open));
    transport.send("ping".to_string()).unwrap();

    // THEN: Only the new listener hears anything
    assert!(matches!(next_callback(&mut new_rx).await, Callback::Message(_)));
    assert!(old_rx.try_recv().is_err());
}
