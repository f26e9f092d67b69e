//! Socket capability consumed by the session actor.
//!
//! A [`Transport`] owns at most one connection. Opening a new one replaces
//! the old one silently: no callbacks fire for a replaced connection.

pub mod websocket;

pub use websocket::WebSocketTransport;

use crate::error::TransportError;

use std::sync::Arc;

use url::Url;

/// Push callbacks for one connection.
pub trait SocketListener: Send + Sync + 'static {
    fn on_open(&self);
    fn on_message(&self, text: String);
    fn on_closed(&self, code: u16, reason: String);
    fn on_failure(&self, error: TransportError);
}

pub trait Transport: Send + Sync + 'static {
    /// Start connecting. Returns immediately; the outcome arrives on `listener`.
    fn open(&self, url: &Url, listener: Arc<dyn SocketListener>) -> Result<(), TransportError>;

    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Begin a close handshake. `on_closed` fires once the peer confirms.
    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError>;
}
