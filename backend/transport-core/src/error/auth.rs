//! Error types for the auth sub-flow.
//!
//! - HTTP status codes stored directly (not parsed from strings)
//! - cancellation is its own variant so superseded requests can be told
//!   apart from real failures without inspecting messages
//! - all errors carry an ErrorLocation captured with `#[track_caller]`

use common::{ErrorLocation, HttpStatusCode};

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError)]
pub enum AuthError {
    #[error("Auth request cancelled {location}")]
    Cancelled { location: ErrorLocation },

    #[error("Network error during {operation}: {message} {location}")]
    Network {
        operation: &'static str,
        message: String,
        is_timeout: bool,
        is_connection: bool,
        location: ErrorLocation,
    },

    #[error("{operation} rejected: HTTP {status_code} - {message} {location}")]
    Response {
        operation: &'static str,
        status_code: HttpStatusCode,
        message: String,
        location: ErrorLocation,
    },

    #[error("Malformed {operation} response: {message} {location}")]
    Decode {
        operation: &'static str,
        message: String,
        location: ErrorLocation,
    },

    #[error("Invalid auth endpoint: {message} {location}")]
    Endpoint {
        message: String,
        location: ErrorLocation,
    },

    #[error("No token held: {message} {location}")]
    MissingToken {
        message: String,
        location: ErrorLocation,
    },
}

impl AuthError {
    #[track_caller]
    pub fn cancelled() -> Self {
        AuthError::Cancelled {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn missing_token(message: impl Into<String>) -> Self {
        AuthError::MissingToken {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn endpoint(message: impl Into<String>) -> Self {
        AuthError::Endpoint {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        AuthError::Decode {
            operation,
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Create from reqwest error with proper categorization.
    #[track_caller]
    pub fn from_reqwest(operation: &'static str, error: &reqwest::Error) -> Self {
        let location = ErrorLocation::from(Location::caller());

        // Check for specific error types BEFORE converting to string
        let is_timeout = error.is_timeout();
        let is_connect = error.is_connect();

        if let Some(status) = error.status()
            && !is_timeout
            && !is_connect
        {
            return AuthError::Response {
                operation,
                status_code: HttpStatusCode(status.as_u16()),
                message: error.to_string(),
                location,
            };
        }

        if error.is_decode() {
            return AuthError::Decode {
                operation,
                message: error.to_string(),
                location,
            };
        }

        AuthError::Network {
            operation,
            message: error.to_string(),
            is_timeout,
            is_connection: is_connect,
            location,
        }
    }

    /// Create from HTTP response with explicit status code.
    #[track_caller]
    pub fn from_http_response(
        operation: &'static str,
        status_code: u16,
        body: impl Into<String>,
    ) -> Self {
        AuthError::Response {
            operation,
            status_code: HttpStatusCode(status_code),
            message: body.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Superseded or abandoned request. Never shown to the user.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AuthError::Cancelled { .. })
    }

    /// Get error category for log lines.
    pub fn error_category(&self) -> &'static str {
        match self {
            AuthError::Cancelled { .. } => "cancelled",
            AuthError::Network {
                is_timeout: true, ..
            } => "timeout",
            AuthError::Network {
                is_connection: true,
                ..
            } => "connection",
            AuthError::Network { .. } => "network",
            AuthError::Response { status_code, .. } if status_code.is_client_error() => {
                "client_error"
            }
            AuthError::Response { status_code, .. } if status_code.is_server_error() => {
                "server_error"
            }
            AuthError::Response { .. } => "response",
            AuthError::Decode { .. } => "decode",
            AuthError::Endpoint { .. } => "endpoint",
            AuthError::MissingToken { .. } => "missing_token",
        }
    }

    /// Get HTTP status code if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuthError::Response { status_code, .. } => Some(status_code.0),
            _ => None,
        }
    }
}

impl From<url::ParseError> for AuthError {
    #[track_caller]
    fn from(error: url::ParseError) -> Self {
        AuthError::Endpoint {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
