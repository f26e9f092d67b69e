use crate::error::SessionError;
use crate::events::{ErrorCode, Event};
use crate::session::{Signal, State, StateMachine};

use std::sync::Arc;

use tokio::sync::mpsc;

fn machine() -> (StateMachine, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StateMachine::new(Arc::new(tx)), rx)
}

fn configured_signal() -> Signal {
    Signal::SessionConfigured {
        connected: true,
        new_session: false,
        read_only: false,
    }
}

fn drop_with_retry() -> Signal {
    Signal::SocketClosed {
        code: 1006,
        reason: "dropped".to_string(),
        reconnect: true,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn given_new_machine_when_created_then_state_is_idle() {
    let (machine, _rx) = machine();

    assert_eq!(machine.state(), &State::Idle);
}

/// **VALUE**: Each accepted transition emits exactly one StateChanged with
/// the old and new state.
///
/// **WHY THIS MATTERS**: Hosts render connection status from these events
/// alone; a missing or duplicated event desynchronises the UI.
#[test]
fn given_connect_and_open_when_applied_then_emits_state_changed_in_order() {
    // GIVEN: A fresh machine
    let (mut machine, mut rx) = machine();

    // WHEN: Connecting then opening the socket
    machine.apply(Signal::Connect).expect("connect");
    machine.apply(Signal::SocketOpened).expect("open");

    // THEN: Two StateChanged events in order
    assert_eq!(
        drain(&mut rx),
        vec![
            Event::StateChanged {
                old: State::Idle,
                new: State::Connecting,
            },
            Event::StateChanged {
                old: State::Connecting,
                new: State::Connected,
            },
        ]
    );
}

/// **VALUE**: A rejected signal is an error and has no side effects.
///
/// **BUG THIS CATCHES**: Would catch the machine replacing its state (or
/// emitting an event) before checking the table.
#[test]
fn given_idle_when_socket_opened_then_rejected_and_state_unchanged() {
    // GIVEN: An idle machine
    let (mut machine, mut rx) = machine();

    // WHEN: Applying a signal the table rejects
    let result = machine.apply(Signal::SocketOpened);

    // THEN: IllegalStateTransition, state still Idle, no event
    assert!(matches!(
        result,
        Err(SessionError::IllegalStateTransition {
            from: State::Idle,
            signal: Signal::SocketOpened,
            ..
        })
    ));
    assert_eq!(machine.state(), &State::Idle);
    assert!(drain(&mut rx).is_empty());
}

/// **VALUE**: A session configured after a reconnect says so, exactly once.
///
/// **WHY THIS MATTERS**: Hosts use `was_reconnecting` to decide whether to
/// reload history; a sticky flag would reload on every reconfigure.
///
/// **BUG THIS CATCHES**: Would catch the flag never being set, or never
/// being cleared after the first Configured.
#[test]
fn given_reconnect_when_configured_then_was_reconnecting_stamped_once() {
    // GIVEN: A configured session that dropped and reopened
    let (mut machine, _rx) = machine();
    machine.apply(Signal::Connect).expect("connect");
    machine.apply(Signal::SocketOpened).expect("open");
    machine.apply(configured_signal()).expect("configure");
    machine.apply(drop_with_retry()).expect("drop");
    machine.apply(Signal::SocketOpened).expect("reopen");

    // WHEN: Reconfigured, then reconfigured again
    let first = machine.apply(configured_signal()).expect("configure").clone();
    let second = machine.apply(configured_signal()).expect("configure").clone();

    // THEN: Only the first carries was_reconnecting
    assert_eq!(
        first,
        State::Configured {
            connected: true,
            new_session: false,
            was_reconnecting: true,
        }
    );
    assert_eq!(
        second,
        State::Configured {
            connected: true,
            new_session: false,
            was_reconnecting: false,
        }
    );
}

#[test]
fn given_reconnect_that_ends_in_error_when_next_session_configured_then_flag_is_cleared() {
    // GIVEN: A reconnect that reopened and then failed fatally
    let (mut machine, _rx) = machine();
    machine.apply(Signal::Connect).expect("connect");
    machine.apply(Signal::SocketOpened).expect("open");
    machine.apply(drop_with_retry()).expect("drop");
    machine.apply(Signal::SocketOpened).expect("reopen");
    machine
        .apply(Signal::SocketFailure {
            code: ErrorCode::WebsocketError,
            message: "reset".to_string(),
            reconnect: false,
        })
        .expect("fail");

    // WHEN: A fresh connect configures a new session
    machine.apply(Signal::Connect).expect("connect");
    machine.apply(Signal::SocketOpened).expect("open");
    let state = machine.apply(configured_signal()).expect("configure").clone();

    // THEN: It is not reported as a reconnect
    assert_eq!(
        state,
        State::Configured {
            connected: true,
            new_session: false,
            was_reconnecting: false,
        }
    );
}
