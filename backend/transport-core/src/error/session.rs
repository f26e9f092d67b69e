use crate::error::{ConfigError, EncodeError, TransportError};
use crate::session::{Signal, State};

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Caller-visible failures of the host command surface.
///
/// Expected wire and network conditions never show up here; they arrive as
/// [`Event::Error`](crate::events::Event::Error) on the event stream.
#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("Illegal State Transition: {signal:?} is not valid in {from:?} {location}")]
    IllegalStateTransition {
        from: State,
        signal: Signal,
        location: ErrorLocation,
    },

    #[error("Invalid Command: '{command}' in {state:?}: {reason} {location}")]
    InvalidCommand {
        command: &'static str,
        state: State,
        reason: String,
        location: ErrorLocation,
    },

    #[error("Session actor stopped {location}")]
    ActorStopped { location: ErrorLocation },

    #[error("No Runtime Error: {message} {location}")]
    NoRuntime {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl SessionError {
    #[track_caller]
    pub fn illegal_transition(from: State, signal: Signal) -> Self {
        SessionError::IllegalStateTransition {
            from,
            signal,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn invalid_command(command: &'static str, state: State, reason: impl Into<String>) -> Self {
        SessionError::InvalidCommand {
            command,
            state,
            reason: reason.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn actor_stopped() -> Self {
        SessionError::ActorStopped {
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
