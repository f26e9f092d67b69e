use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Inbound frame could not be turned into a [`WireMessage`](crate::codec::WireMessage).
///
/// Always non-fatal for the session: the actor logs it and surfaces an error
/// event without changing state.
#[derive(Debug, ThisError)]
pub enum DecodeError {
    #[error("Invalid JSON Error: {message} {location}")]
    InvalidJson {
        message: String,
        location: ErrorLocation,
    },

    #[error("Missing Discriminator Error: envelope has no 'messageClass' {location}")]
    MissingDiscriminator { location: ErrorLocation },

    #[error("Unknown Message Class Error: '{class}' {location}")]
    UnknownClass {
        class: String,
        location: ErrorLocation,
    },

    #[error("Invalid Payload Error for '{class}': {message} {location}")]
    InvalidPayload {
        class: &'static str,
        message: String,
        location: ErrorLocation,
    },
}

impl DecodeError {
    #[track_caller]
    pub fn invalid_json(message: impl Into<String>) -> Self {
        DecodeError::InvalidJson {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn missing_discriminator() -> Self {
        DecodeError::MissingDiscriminator {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn unknown_class(class: impl Into<String>) -> Self {
        DecodeError::UnknownClass {
            class: class.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn invalid_payload(class: &'static str, message: impl Into<String>) -> Self {
        DecodeError::InvalidPayload {
            class,
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum EncodeError {
    #[error("Serialization Error: {message} {location}")]
    Serialization {
        message: String,
        location: ErrorLocation,
    },
}

impl From<serde_json::Error> for EncodeError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        EncodeError::Serialization {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
