//! Session states, the signals that move between them, and the transition
//! table. [`transition`] is a total function: every pair not listed returns
//! `None` and the caller rejects it.

use crate::events::ErrorCode;
use crate::{ABNORMAL_CLOSURE_CODE, NORMAL_CLOSURE_CODE};

pub const LOGOUT_REASON: &str = "The user has logged out.";
pub const CONVERSATION_CLEARED_REASON: &str = "The conversation has been cleared.";
pub const REMOTE_CLOSED_REASON: &str = "The session was closed from another connection.";
pub const RECONNECT_EXHAUSTED_REASON: &str = "Reconnection attempts exhausted.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Connected,
    Configured {
        connected: bool,
        new_session: bool,
        was_reconnecting: bool,
    },
    ReadOnly,
    Reconnecting,
    Closing {
        code: u16,
        reason: String,
    },
    Closed {
        code: u16,
        reason: String,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl State {
    /// `Closed` and an `Error` with a non-recoverable code.
    pub fn is_terminal(&self) -> bool {
        match self {
            State::Closed { .. } => true,
            State::Error { code, .. } => !code.is_recoverable(),
            _ => false,
        }
    }

    /// States with a live (or opening) socket that can drop.
    fn has_socket(&self) -> bool {
        matches!(
            self,
            State::Connecting
                | State::Connected
                | State::Configured { .. }
                | State::ReadOnly
                | State::Reconnecting
        )
    }

    fn is_session_open(&self) -> bool {
        matches!(self, State::Configured { .. } | State::ReadOnly)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Connect,
    SocketOpened,
    SessionConfigured {
        connected: bool,
        new_session: bool,
        read_only: bool,
    },
    SessionExpired,
    Logout,
    SessionCleared,
    RemoteClosed,
    Disconnect {
        code: u16,
        reason: String,
    },
    SocketClosed {
        code: u16,
        reason: String,
        reconnect: bool,
    },
    SocketFailure {
        code: ErrorCode,
        message: String,
        reconnect: bool,
    },
    ReconnectExhausted,
}

/// Next state for `(from, signal)`, or `None` if the pair is not allowed.
///
/// `Configured` always comes out with `was_reconnecting: false`;
/// [`StateMachine`](super::StateMachine) stamps the real value.
pub fn transition(from: &State, signal: &Signal) -> Option<State> {
    use Signal as S;
    use State as St;

    let next = match (from, signal) {
        (St::Idle | St::Closed { .. }, S::Connect) => St::Connecting,
        (St::Error { code, .. }, S::Connect) if code.is_recoverable() => St::Connecting,

        (St::Connecting | St::Reconnecting, S::SocketOpened) => St::Connected,

        (
            St::Connected | St::Configured { .. },
            S::SessionConfigured {
                connected,
                new_session,
                read_only,
            },
        ) => {
            if *read_only {
                St::ReadOnly
            } else {
                St::Configured {
                    connected: *connected,
                    new_session: *new_session,
                    was_reconnecting: false,
                }
            }
        }

        (St::Configured { .. }, S::SessionExpired) => St::ReadOnly,

        (state, S::Logout) if state.is_session_open() => St::Closed {
            code: NORMAL_CLOSURE_CODE,
            reason: LOGOUT_REASON.to_string(),
        },

        (state, S::SessionCleared) if state.is_session_open() => St::Closing {
            code: NORMAL_CLOSURE_CODE,
            reason: CONVERSATION_CLEARED_REASON.to_string(),
        },

        (St::Connected | St::Configured { .. } | St::ReadOnly, S::RemoteClosed) => St::Closing {
            code: NORMAL_CLOSURE_CODE,
            reason: REMOTE_CLOSED_REASON.to_string(),
        },

        (St::Closing { .. }, S::Disconnect { .. }) => return None,
        (state, S::Disconnect { code, reason }) if !state.is_terminal() => St::Closing {
            code: *code,
            reason: reason.clone(),
        },

        // A requested close keeps the reason it was requested with.
        (St::Closing { code, reason }, S::SocketClosed { .. }) => St::Closed {
            code: *code,
            reason: reason.clone(),
        },
        (state, S::SocketClosed { reconnect: true, .. }) if state.has_socket() => {
            St::Reconnecting
        }
        (
            state,
            S::SocketClosed {
                code,
                reason,
                reconnect: false,
            },
        ) if state.has_socket() => St::Closed {
            code: *code,
            reason: reason.clone(),
        },

        (St::Closing { .. }, S::SocketFailure { message, .. }) => St::Closed {
            code: ABNORMAL_CLOSURE_CODE,
            reason: message.clone(),
        },
        (state, S::SocketFailure { reconnect: true, .. }) if state.has_socket() => {
            St::Reconnecting
        }
        (
            state,
            S::SocketFailure {
                code,
                message,
                reconnect: false,
            },
        ) if state.has_socket() => St::Error {
            code: *code,
            message: message.clone(),
        },

        (St::Reconnecting, S::ReconnectExhausted) => St::Closed {
            code: ABNORMAL_CLOSURE_CODE,
            reason: RECONNECT_EXHAUSTED_REASON.to_string(),
        },

        _ => return None,
    };

    Some(next)
}
