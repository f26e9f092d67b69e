use crate::ABNORMAL_CLOSURE_CODE;
use crate::error::TransportError;
use crate::transport::{SocketListener, Transport};

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// [`Transport`] over tokio-tungstenite.
///
/// One task per connection: it connects, then multiplexes outbound frames
/// from a channel with inbound frames from the socket.
#[derive(Default)]
pub struct WebSocketTransport {
    connection: Mutex<Option<Connection>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, TransportError> {
        self.connection
            .lock()
            .map_err(|e| TransportError::connect(format!("Connection lock poisoned: {e}")))
    }

    fn enqueue(&self, frame: Outbound) -> Result<(), TransportError> {
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or_else(TransportError::not_connected)?;
        connection
            .outbound
            .send(frame)
            .map_err(|_| TransportError::not_connected())
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &Url, listener: Arc<dyn SocketListener>) -> Result<(), TransportError> {
        let mut guard = self.lock()?;
        if let Some(previous) = guard.take() {
            debug!("Replacing existing WebSocket connection");
            previous.task.abort();
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let url = url.clone();
        let task = tokio::spawn(run_connection(url, listener, outbound_rx));

        *guard = Some(Connection { outbound, task });
        Ok(())
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        self.enqueue(Outbound::Text(text))
    }

    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.enqueue(Outbound::Close {
            code,
            reason: reason.to_string(),
        })
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.connection.lock()
            && let Some(connection) = guard.take()
        {
            connection.task.abort();
        }
    }
}

async fn run_connection(
    url: Url,
    listener: Arc<dyn SocketListener>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    info!("Connecting to {}", url.as_str());

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("WebSocket connect failed: {e}");
            listener.on_failure(TransportError::from_tungstenite(&e));
            return;
        }
    };

    info!("WebSocket connected");
    listener.on_open();

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    // Transport dropped the connection handle.
                    debug!("Outbound channel closed, stopping connection task");
                    return;
                };

                let message = match frame {
                    Outbound::Text(text) => {
                        trace!("Sending {} byte frame", text.len());
                        Message::Text(text.into())
                    }
                    Outbound::Close { code, reason } => {
                        debug!("Sending close frame {code}: {reason}");
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        }))
                    }
                };

                if let Err(e) = write.send(message).await {
                    warn!("WebSocket send failed: {e}");
                    listener.on_failure(TransportError::send(e.to_string()));
                    return;
                }
            }
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => listener.on_message(text.as_str().to_owned()),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((ABNORMAL_CLOSURE_CODE, String::new()));
                    info!("WebSocket closed {code}: {reason}");
                    listener.on_closed(code, reason);
                    return;
                }
                Some(Ok(other)) => trace!("Ignoring non-text frame: {other:?}"),
                Some(Err(e)) => {
                    warn!("WebSocket read failed: {e}");
                    listener.on_failure(TransportError::read(e.to_string()));
                    return;
                }
                None => {
                    info!("WebSocket stream ended without close frame");
                    listener.on_closed(ABNORMAL_CLOSURE_CODE, String::from("Connection dropped"));
                    return;
                }
            },
        }
    }
}
