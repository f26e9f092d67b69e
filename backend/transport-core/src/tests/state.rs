use crate::events::ErrorCode;
use crate::session::state::{
    CONVERSATION_CLEARED_REASON, LOGOUT_REASON, RECONNECT_EXHAUSTED_REASON, REMOTE_CLOSED_REASON,
};
use crate::session::{Signal, State, transition};

fn states() -> Vec<(&'static str, State)> {
    vec![
        ("idle", State::Idle),
        ("connecting", State::Connecting),
        ("connected", State::Connected),
        (
            "configured",
            State::Configured {
                connected: true,
                new_session: false,
                was_reconnecting: false,
            },
        ),
        ("read_only", State::ReadOnly),
        ("reconnecting", State::Reconnecting),
        (
            "closing",
            State::Closing {
                code: 1000,
                reason: "bye".to_string(),
            },
        ),
        (
            "closed",
            State::Closed {
                code: 1000,
                reason: "done".to_string(),
            },
        ),
        (
            "error_recoverable",
            State::Error {
                code: ErrorCode::WebsocketError,
                message: "net".to_string(),
            },
        ),
        (
            "error_fatal",
            State::Error {
                code: ErrorCode::WebsocketAccessDenied,
                message: "denied".to_string(),
            },
        ),
    ]
}

fn signals() -> Vec<(&'static str, Signal)> {
    vec![
        ("connect", Signal::Connect),
        ("opened", Signal::SocketOpened),
        (
            "configured",
            Signal::SessionConfigured {
                connected: true,
                new_session: true,
                read_only: false,
            },
        ),
        (
            "configured_read_only",
            Signal::SessionConfigured {
                connected: true,
                new_session: false,
                read_only: true,
            },
        ),
        ("expired", Signal::SessionExpired),
        ("logout", Signal::Logout),
        ("cleared", Signal::SessionCleared),
        ("remote_closed", Signal::RemoteClosed),
        (
            "disconnect",
            Signal::Disconnect {
                code: 1000,
                reason: "user".to_string(),
            },
        ),
        (
            "closed_retry",
            Signal::SocketClosed {
                code: 1001,
                reason: "away".to_string(),
                reconnect: true,
            },
        ),
        (
            "closed_final",
            Signal::SocketClosed {
                code: 1000,
                reason: "normal".to_string(),
                reconnect: false,
            },
        ),
        (
            "failure_retry",
            Signal::SocketFailure {
                code: ErrorCode::WebsocketError,
                message: "reset".to_string(),
                reconnect: true,
            },
        ),
        (
            "failure_final",
            Signal::SocketFailure {
                code: ErrorCode::WebsocketAccessDenied,
                message: "denied".to_string(),
                reconnect: false,
            },
        ),
        ("exhausted", Signal::ReconnectExhausted),
    ]
}

fn closed(code: u16, reason: &str) -> State {
    State::Closed {
        code,
        reason: reason.to_string(),
    }
}

fn closing(code: u16, reason: &str) -> State {
    State::Closing {
        code,
        reason: reason.to_string(),
    }
}

/// Every accepted (state, signal) pair and where it leads.
fn allowed() -> Vec<(&'static str, &'static str, State)> {
    let configured = State::Configured {
        connected: true,
        new_session: true,
        was_reconnecting: false,
    };
    let denied = State::Error {
        code: ErrorCode::WebsocketAccessDenied,
        message: "denied".to_string(),
    };

    let mut table = vec![
        ("idle", "connect", State::Connecting),
        ("closed", "connect", State::Connecting),
        ("error_recoverable", "connect", State::Connecting),
        ("connecting", "opened", State::Connected),
        ("reconnecting", "opened", State::Connected),
        ("connected", "configured", configured.clone()),
        ("configured", "configured", configured),
        ("connected", "configured_read_only", State::ReadOnly),
        ("configured", "configured_read_only", State::ReadOnly),
        ("configured", "expired", State::ReadOnly),
        ("configured", "logout", closed(1000, LOGOUT_REASON)),
        ("read_only", "logout", closed(1000, LOGOUT_REASON)),
        ("configured", "cleared", closing(1000, CONVERSATION_CLEARED_REASON)),
        ("read_only", "cleared", closing(1000, CONVERSATION_CLEARED_REASON)),
        ("connected", "remote_closed", closing(1000, REMOTE_CLOSED_REASON)),
        ("configured", "remote_closed", closing(1000, REMOTE_CLOSED_REASON)),
        ("read_only", "remote_closed", closing(1000, REMOTE_CLOSED_REASON)),
        ("closing", "closed_retry", closed(1000, "bye")),
        ("closing", "closed_final", closed(1000, "bye")),
        ("closing", "failure_retry", closed(1006, "reset")),
        ("closing", "failure_final", closed(1006, "denied")),
        ("reconnecting", "exhausted", closed(1006, RECONNECT_EXHAUSTED_REASON)),
    ];

    for state in [
        "idle",
        "connecting",
        "connected",
        "configured",
        "read_only",
        "reconnecting",
        "error_recoverable",
    ] {
        table.push((state, "disconnect", closing(1000, "user")));
    }

    for state in [
        "connecting",
        "connected",
        "configured",
        "read_only",
        "reconnecting",
    ] {
        table.push((state, "closed_retry", State::Reconnecting));
        table.push((state, "closed_final", closed(1000, "normal")));
        table.push((state, "failure_retry", State::Reconnecting));
        table.push((state, "failure_final", denied.clone()));
    }

    table
}

/// **VALUE**: Checks the whole transition table, including every pair that
/// must be rejected.
///
/// **WHY THIS MATTERS**: The actor trusts `transition` completely; a pair
/// that slips through unnoticed means a command is accepted in a state
/// where the socket cannot serve it.
///
/// **BUG THIS CATCHES**: Would catch a catch-all arm accepting signals from
/// terminal states, or a reordered arm shadowing the Closing rules.
#[test]
fn given_every_state_and_signal_when_transitioned_then_matches_table() {
    // GIVEN: The full cross product and the expected accepted pairs
    let allowed = allowed();

    for (state_name, state) in states() {
        for (signal_name, signal) in signals() {
            // WHEN: Looking up the transition
            let actual = transition(&state, &signal);

            // THEN: Accepted pairs reach the listed state, all others are rejected
            let expected = allowed
                .iter()
                .find(|(s, g, _)| *s == state_name && *g == signal_name)
                .map(|(_, _, next)| next.clone());

            assert_eq!(
                actual, expected,
                "transition({state_name}, {signal_name})"
            );
        }
    }
}

#[test]
fn given_terminal_states_when_checked_then_only_closed_and_fatal_error_are_terminal() {
    let terminal: Vec<&str> = states()
        .into_iter()
        .filter(|(_, state)| state.is_terminal())
        .map(|(name, _)| name)
        .collect();

    assert_eq!(terminal, vec!["closed", "error_fatal"]);
}

/// **VALUE**: A requested close keeps its own reason even when the server
/// answers with a different one.
///
/// **BUG THIS CATCHES**: Would catch Closing -> Closed taking the socket's
/// close reason and losing "The user has logged out." style messages.
#[test]
fn given_closing_with_reason_when_socket_reports_other_reason_then_requested_reason_wins() {
    // GIVEN: A close requested after a conversation clear
    let from = closing(1000, CONVERSATION_CLEARED_REASON);

    // WHEN: The socket closes with the server's own reason
    let next = transition(
        &from,
        &Signal::SocketClosed {
            code: 1001,
            reason: "Going away".to_string(),
            reconnect: true,
        },
    );

    // THEN: The cleared reason is kept
    assert_eq!(next, Some(closed(1000, CONVERSATION_CLEARED_REASON)));
}
