use crate::session_tests::helpers::{
    Harness, configured, open_configured, session_response, start, test_config, wait_for_state,
};

use transport_core::error::TransportError;
use transport_core::events::Event;
use transport_core::session::State;
use transport_core::session::state::RECONNECT_EXHAUSTED_REASON;

use std::time::Duration;

use tokio::time::sleep as TokioSleep;

/// Let paused time run until the transport has been opened `count` times.
async fn wait_for_open_count(harness: &Harness, count: usize) {
    for _ in 0..100 {
        if harness.transport.open_count() >= count {
            return;
        }
        TokioSleep(Duration::from_millis(500)).await;
    }
    panic!(
        "transport opened {} times, expected {count}",
        harness.transport.open_count()
    );
}

/// **VALUE**: An unexpected drop reconnects and re-configures on its own,
/// and the restored session says it came from a reconnect.
///
/// **WHY THIS MATTERS**: Mobile networks drop sockets constantly; the host
/// should see a brief Reconnecting, not a dead session.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - A non-normal close goes straight to Closed
/// - The reconnect fires before the interval
/// - The configure frame is not re-sent on the new socket
/// - `was_reconnecting` is never set
#[tokio::test(start_paused = true)]
async fn given_configured_session_when_socket_drops_then_reconnects_and_reconfigures() {
    // GIVEN: A configured session
    let mut harness = start(test_config());
    open_configured(&mut harness).await;
    let configures_before = harness.transport.sent().len();

    // WHEN: The socket drops abnormally
    harness
        .transport
        .listener()
        .on_closed(1006, "Connection dropped".to_string());

    // THEN: Reconnecting, and no reopen before the interval
    wait_for_state(&mut harness.events, State::Reconnecting).await;
    TokioSleep(Duration::from_millis(2900)).await;
    assert_eq!(harness.transport.open_count(), 1);

    // WHEN: The interval passes and the new socket opens
    wait_for_open_count(&harness, 2).await;
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;

    // THEN: The configure frame is re-sent
    let sent = harness.transport.sent();
    assert_eq!(sent.len(), configures_before + 1);
    assert_eq!(harness.transport.last_sent()["action"], "configureSession");

    // WHEN: The server confirms
    harness
        .transport
        .listener()
        .on_message(session_response(false, false));

    // THEN: Configured, flagged as a reconnect
    wait_for_state(&mut harness.events, configured(false, true)).await;
}

#[tokio::test(start_paused = true)]
async fn given_configured_session_when_normal_close_then_closed_without_reconnect() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    harness
        .transport
        .listener()
        .on_closed(1000, "Server shutting down".to_string());

    wait_for_state(
        &mut harness.events,
        State::Closed {
            code: 1000,
            reason: "Server shutting down".to_string(),
        },
    )
    .await;
    TokioSleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.open_count(), 1);
}

/// **VALUE**: Running out of attempts ends in Closed with an abnormal code.
///
/// **BUG THIS CATCHES**: Would catch a reconnect loop that never gives up
/// when every attempt fails before the socket opens.
#[tokio::test(start_paused = true)]
async fn given_single_attempt_budget_when_reconnect_fails_then_closed_as_exhausted() {
    // GIVEN: A budget of one reconnect attempt
    let mut config = test_config();
    config.reconnection_timeout_secs = 3;
    let mut harness = start(config);
    open_configured(&mut harness).await;

    // WHEN: The socket drops and the single reconnect attempt fails too
    harness
        .transport
        .listener()
        .on_closed(1006, "Connection dropped".to_string());
    wait_for_state(&mut harness.events, State::Reconnecting).await;
    wait_for_open_count(&harness, 2).await;
    harness.transport.listener().on_failure(TransportError::connect("refused"));

    // THEN: Closed with the abnormal code, no further attempts
    wait_for_state(
        &mut harness.events,
        State::Closed {
            code: 1006,
            reason: RECONNECT_EXHAUSTED_REASON.to_string(),
        },
    )
    .await;
    TokioSleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.open_count(), 2);
}

/// **VALUE**: Callbacks from a replaced connection are ignored.
///
/// **WHY THIS MATTERS**: A late close from the old socket would otherwise
/// knock the freshly restored session back into Reconnecting.
#[tokio::test(start_paused = true)]
async fn given_reconnected_session_when_old_socket_reports_close_then_ignored() {
    // GIVEN: A session that reconnected onto a second socket
    let mut harness = start(test_config());
    open_configured(&mut harness).await;
    let old_listener = harness.transport.listener();
    old_listener.on_closed(1006, "Connection dropped".to_string());
    wait_for_state(&mut harness.events, State::Reconnecting).await;
    wait_for_open_count(&harness, 2).await;
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;

    // WHEN: The old socket fires again
    old_listener.on_closed(1006, "late".to_string());
    old_listener.on_message(session_response(true, true));

    // THEN: The live socket's traffic is the only thing that counts
    harness
        .transport
        .listener()
        .on_message(session_response(false, false));
    let mut saw_stale_effect = false;
    loop {
        let event = harness.events.recv().await.expect("stream closed");
        if let Event::StateChanged { new, .. } = event {
            if new == State::ReadOnly || new == State::Reconnecting {
                saw_stale_effect = true;
            }
            if new == configured(false, true) {
                break;
            }
        }
    }
    assert!(!saw_stale_effect);
}

#[tokio::test(start_paused = true)]
async fn given_reconnecting_session_when_disconnected_then_pending_reconnect_cancelled() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;
    harness
        .transport
        .listener()
        .on_closed(1006, "Connection dropped".to_string());
    wait_for_state(&mut harness.events, State::Reconnecting).await;

    harness
        .client
        .disconnect(1000, "gave up")
        .await
        .expect("disconnect");
    TokioSleep(Duration::from_secs(10)).await;

    assert_eq!(harness.transport.open_count(), 1);
    assert_eq!(
        harness.client.state().await,
        State::Closed {
            code: 1000,
            reason: "gave up".to_string(),
        }
    );
}
