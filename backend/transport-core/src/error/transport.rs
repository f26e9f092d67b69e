use crate::events::ErrorCode;

use common::{ErrorLocation, HttpStatusCode};

use std::io::ErrorKind;
use std::panic::Location;

use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Socket-level failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, ThisError)]
pub enum TransportError {
    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
    },

    #[error("Network Unavailable Error: {message} {location}")]
    NetworkUnavailable {
        message: String,
        location: ErrorLocation,
    },

    #[error("Access Denied Error: {message} {location}")]
    AccessDenied {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("Read Error: {message} {location}")]
    Read {
        message: String,
        location: ErrorLocation,
    },

    #[error("Not Connected Error {location}")]
    NotConnected { location: ErrorLocation },
}

impl TransportError {
    #[track_caller]
    pub fn connect(message: impl Into<String>) -> Self {
        TransportError::Connect {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn send(message: impl Into<String>) -> Self {
        TransportError::Send {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn read(message: impl Into<String>) -> Self {
        TransportError::Read {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn not_connected() -> Self {
        TransportError::NotConnected {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Classify a WebSocket failure.
    ///
    /// A rejected upgrade (403) is an access problem that reconnecting cannot
    /// fix; unreachable networks are reported separately so hosts can tell
    /// the user to go online.
    #[track_caller]
    pub fn from_tungstenite(error: &WsError) -> Self {
        let location = ErrorLocation::from(Location::caller());

        match error {
            WsError::Http(response)
                if HttpStatusCode(response.status().as_u16()) == HttpStatusCode::FORBIDDEN =>
            {
                TransportError::AccessDenied {
                    message: format!("WebSocket upgrade rejected: {}", response.status()),
                    location,
                }
            }
            WsError::Io(io)
                if matches!(
                    io.kind(),
                    ErrorKind::NetworkUnreachable
                        | ErrorKind::HostUnreachable
                        | ErrorKind::NetworkDown
                ) =>
            {
                TransportError::NetworkUnavailable {
                    message: io.to_string(),
                    location,
                }
            }
            other => TransportError::Connect {
                message: other.to_string(),
                location,
            },
        }
    }

    /// Wire-level error code surfaced to the host for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TransportError::AccessDenied { .. } => ErrorCode::WebsocketAccessDenied,
            TransportError::NetworkUnavailable { .. } => ErrorCode::NetworkDisabled,
            TransportError::Connect { .. }
            | TransportError::Send { .. }
            | TransportError::Read { .. }
            | TransportError::NotConnected { .. } => ErrorCode::WebsocketError,
        }
    }
}
