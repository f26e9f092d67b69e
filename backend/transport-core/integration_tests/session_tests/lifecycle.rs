use crate::session_tests::helpers::{
    DEPLOYMENT_ID, MockTransport, collect_until, configured, frame, open_authenticated,
    open_configured, session_response, start, start_with_transport, test_config, wait_for_event,
    wait_for_state,
};

use transport_core::error::{SessionError, TransportError};
use transport_core::events::{CorrectiveAction, ErrorCode, Event};
use transport_core::session::State;
use transport_core::session::state::{CONVERSATION_CLEARED_REASON, LOGOUT_REASON};

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::atomic::Ordering;

use serde_json::json;

/// **VALUE**: Verifies the happy path from Idle to a configured session.
///
/// **WHY THIS MATTERS**: Every host starts with connect, open and configure.
/// If any hop is missing the session never carries a message.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The socket URL is built from the wrong domain or loses the deployment id
/// - The configure frame is sent before the socket opens
/// - A SessionResponse does not move the session to Configured
#[tokio::test]
async fn given_new_client_when_connected_and_configured_then_session_is_configured() {
    // GIVEN: A fresh client
    let mut harness = start(test_config());
    assert_eq!(harness.client.state().await, State::Idle);

    // WHEN: Connecting
    harness.client.connect().await.expect("connect");

    // THEN: Connecting, one open to the deployment's socket URL
    assert_eq!(harness.client.state().await, State::Connecting);
    assert_eq!(
        harness.transport.urls()[0].as_str(),
        format!("wss://webmessaging.example.test/v1?deploymentId={DEPLOYMENT_ID}")
    );

    // WHEN: The socket opens and the session is configured
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;
    harness
        .client
        .configure_session()
        .await
        .expect("configure_session");

    // THEN: A configureSession frame went out
    let sent = harness.transport.last_sent();
    assert_eq!(sent["action"], "configureSession");
    assert_eq!(sent["deploymentId"], DEPLOYMENT_ID);
    assert_eq!(sent["journeyContext"]["customer"]["id"], sent["token"]);

    // WHEN: The server confirms
    harness
        .transport
        .listener()
        .on_message(session_response(true, false));

    // THEN: Configured, and the advertised duration is recorded
    wait_for_state(&mut harness.events, configured(true, false)).await;
    wait_for_event(&mut harness.events, |event| {
        matches!(event, Event::SessionDurationUpdated(_))
    })
    .await;
    let duration = harness.client.session_duration().await;
    assert_eq!(duration.duration_seconds, Some(259_200));
    assert_eq!(duration.expiration_date, Some(4_102_444_800));
}

#[tokio::test]
async fn given_read_only_session_response_when_configured_then_session_is_read_only() {
    let mut harness = start(test_config());
    harness.client.connect().await.expect("connect");
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;
    harness.client.configure_session().await.expect("configure");

    harness
        .transport
        .listener()
        .on_message(session_response(false, true));

    wait_for_state(&mut harness.events, State::ReadOnly).await;
    let result = harness.client.send_message("hi", BTreeMap::new()).await;
    assert!(matches!(result, Err(SessionError::InvalidCommand { .. })));
}

/// **VALUE**: Commands are checked against the current state.
///
/// **BUG THIS CATCHES**: Would catch a send reaching the socket before the
/// session is configured, or configure running while still Idle.
#[tokio::test]
async fn given_idle_client_when_session_commands_issued_then_rejected() {
    // GIVEN: An idle client
    let harness = start(test_config());

    // WHEN: Issuing commands that need an open session
    let send = harness.client.send_message("hi", BTreeMap::new()).await;
    let configure = harness.client.configure_session().await;
    let health = harness.client.health_check().await;

    // THEN: All rejected, nothing sent, still Idle
    for result in [send, configure, health] {
        assert!(
            matches!(result, Err(SessionError::InvalidCommand { state: State::Idle, .. })),
            "got {result:?}"
        );
    }
    assert!(harness.transport.sent().is_empty());
    assert_eq!(harness.client.state().await, State::Idle);
}

#[tokio::test]
async fn given_no_token_when_configuring_authenticated_session_then_rejected() {
    let mut harness = start(test_config());
    harness.client.connect().await.expect("connect");
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;

    let result = harness.client.configure_authenticated_session().await;

    assert!(matches!(result, Err(SessionError::InvalidCommand { .. })));
    assert!(harness.transport.sent().is_empty());
}

#[tokio::test]
async fn given_connecting_client_when_connect_called_again_then_illegal_transition() {
    let harness = start(test_config());
    harness.client.connect().await.expect("connect");

    let result = harness.client.connect().await;

    assert!(matches!(
        result,
        Err(SessionError::IllegalStateTransition {
            from: State::Connecting,
            ..
        })
    ));
    assert_eq!(harness.transport.open_count(), 1);
}

#[tokio::test]
async fn given_configured_session_when_message_sent_then_on_message_frame_carries_attributes() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    harness
        .client
        .send_message(
            "Hello",
            BTreeMap::from([("orderId".to_string(), "42".to_string())]),
        )
        .await
        .expect("send_message");

    let sent = harness.transport.last_sent();
    assert_eq!(sent["action"], "onMessage");
    assert_eq!(sent["message"]["text"], "Hello");
    assert_eq!(
        sent["message"]["channel"]["metadata"]["customAttributes"]["orderId"],
        "42"
    );
}

#[tokio::test]
async fn given_configured_session_when_messages_arrive_then_surfaced_as_events() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;
    let listener = harness.transport.listener();

    listener.on_message(frame(
        "message",
        "StructuredMessage",
        200,
        json!({"id": "m-1", "type": "Text", "text": "Hi there", "direction": "Outbound"}),
    ));
    listener.on_message(frame(
        "message",
        "AttachmentDeletedResponse",
        200,
        json!({"attachmentId": "att-1"}),
    ));
    listener.on_message(frame(
        "response",
        "JwtResponse",
        200,
        json!({"jwt": "download-jwt", "exp": 1_700_000_000}),
    ));

    let message = wait_for_event(&mut harness.events, |event| {
        matches!(event, Event::MessageReceived(_))
    })
    .await;
    match message {
        Event::MessageReceived(message) => assert_eq!(message.text.as_deref(), Some("Hi there")),
        other => panic!("unexpected {other:?}"),
    }
    wait_for_event(&mut harness.events, |event| matches!(event, Event::Attachment(_))).await;
    let jwt = wait_for_event(&mut harness.events, |event| {
        matches!(event, Event::JwtReceived { .. })
    })
    .await;
    assert_eq!(
        jwt,
        Event::JwtReceived {
            jwt: "download-jwt".to_string(),
            exp: 1_700_000_000,
        }
    );
}

/// **VALUE**: A health check round trip is reported as HealthChecked, not as
/// a conversation message.
#[tokio::test]
async fn given_configured_session_when_health_check_echoed_then_health_checked_event() {
    // GIVEN: A configured session that sent a health check
    let mut harness = start(test_config());
    open_configured(&mut harness).await;
    harness.client.health_check().await.expect("health_check");
    let sent = harness.transport.last_sent();
    assert_eq!(sent["action"], "echo");

    // WHEN: The server echoes it back
    harness.transport.listener().on_message(frame(
        "message",
        "StructuredMessage",
        200,
        json!({
            "id": "echo-1",
            "type": "Text",
            "text": sent["message"]["text"],
            "direction": "Inbound",
            "metadata": sent["message"]["metadata"],
        }),
    ));

    // THEN: HealthChecked, with no MessageReceived before it
    let events = collect_until(&mut harness.events, |event| {
        matches!(event, Event::HealthChecked)
    })
    .await;
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, Event::MessageReceived(_)))
    );
}

/// **VALUE**: An undecodable frame is reported and otherwise ignored.
///
/// **WHY THIS MATTERS**: One bad frame from the server must not tear down a
/// working session.
///
/// **BUG THIS CATCHES**: Would catch a decode failure being treated as a
/// socket failure (reconnect) or changing state.
#[tokio::test]
async fn given_configured_session_when_garbage_frame_arrives_then_error_event_and_state_kept() {
    // GIVEN: A configured session
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    // WHEN: An unknown class arrives
    harness.transport.listener().on_message(frame(
        "message",
        "SomethingNew",
        200,
        json!({}),
    ));

    // THEN: One UnexpectedError, state unchanged
    let event = wait_for_event(&mut harness.events, |event| matches!(event, Event::Error { .. }))
        .await;
    assert!(matches!(
        event,
        Event::Error {
            code: ErrorCode::UnexpectedError,
            ..
        }
    ));
    assert_eq!(harness.client.state().await, configured(true, false));
}

#[tokio::test]
async fn given_error_string_message_when_received_then_error_event_with_mapped_code() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    harness.transport.listener().on_message(frame(
        "message",
        "StringMessage",
        4011,
        json!("Message exceeds the maximum length"),
    ));

    let event = wait_for_event(&mut harness.events, |event| matches!(event, Event::Error { .. }))
        .await;
    assert_eq!(
        event,
        Event::Error {
            code: ErrorCode::MessageTooLong,
            message: "Message exceeds the maximum length".to_string(),
            corrective_action: CorrectiveAction::Unknown,
        }
    );
}

/// **VALUE**: Backend error codes outside the HTTP ranges still surface.
///
/// **BUG THIS CATCHES**: Would catch a 4006 or 5000 StringMessage being
/// logged as an informational message with no error event.
#[tokio::test]
async fn given_backend_error_codes_when_string_message_received_then_each_maps_to_error() {
    // GIVEN: A configured session
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    let cases = [
        (4006, ErrorCode::SessionHasExpired, CorrectiveAction::Unknown),
        (4029, ErrorCode::RequestRateTooHigh, CorrectiveAction::TooManyRequests),
        (5000, ErrorCode::UnexpectedError, CorrectiveAction::Unknown),
        (404, ErrorCode::ClientResponseError(404), CorrectiveAction::NotFound),
    ];

    for (code, expected_code, expected_action) in cases {
        // WHEN: The backend reports the code
        harness.transport.listener().on_message(frame(
            "response",
            "StringMessage",
            code,
            json!(format!("failure {code}")),
        ));

        // THEN: One error with the mapped code and action
        let event =
            wait_for_event(&mut harness.events, |event| matches!(event, Event::Error { .. }))
                .await;
        assert_eq!(
            event,
            Event::Error {
                code: expected_code,
                message: format!("failure {code}"),
                corrective_action: expected_action,
            },
            "for code {code}"
        );
    }
}

#[tokio::test]
async fn given_informational_string_message_when_received_then_no_error() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    harness
        .transport
        .listener()
        .on_message(frame("response", "StringMessage", 200, json!("Request accepted.")));
    harness
        .transport
        .listener()
        .on_message(frame("message", "SessionExpiredEvent", 200, json!(null)));

    let seen = collect_until(&mut harness.events, |event| {
        matches!(event, Event::StateChanged { new: State::ReadOnly, .. })
    })
    .await;
    assert!(
        !seen.iter().any(|event| matches!(event, Event::Error { .. })),
        "saw {seen:?}"
    );
}

/// **VALUE**: Disconnecting during the handshake ends quietly.
///
/// **WHY THIS MATTERS**: A real socket only queues the close frame until the
/// handshake finishes, so the open callback still arrives after Closing.
///
/// **BUG THIS CATCHES**: Would catch the late open being reported as an
/// illegal transition error after an ordinary user disconnect.
#[tokio::test]
async fn given_connecting_when_disconnected_before_open_then_late_open_is_ignored() {
    // GIVEN: A socket whose close waits for the handshake
    let mut harness = start_with_transport(test_config(), MockTransport::queuing_closes());
    harness.client.connect().await.expect("connect");

    // WHEN: Disconnecting before the open, then the handshake completes
    harness
        .client
        .disconnect_normally()
        .await
        .expect("disconnect");
    let listener = harness.transport.listener();
    listener.on_open();
    listener.on_closed(1000, "bye".to_string());

    // THEN: Closing then Closed, no error
    let seen = collect_until(&mut harness.events, |event| {
        matches!(event, Event::StateChanged { new: State::Closed { .. }, .. })
    })
    .await;
    assert!(
        !seen.iter().any(|event| matches!(event, Event::Error { .. })),
        "saw {seen:?}"
    );
    assert_eq!(harness.transport.closes().len(), 1);
    assert!(matches!(harness.client.state().await, State::Closed { .. }));
}

#[tokio::test]
async fn given_configured_session_when_session_expired_then_read_only() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    harness
        .transport
        .listener()
        .on_message(frame("message", "SessionExpiredEvent", 200, json!(null)));

    wait_for_state(&mut harness.events, State::ReadOnly).await;
}

/// **VALUE**: A host disconnect closes the socket and ends in Closed with the
/// host's reason.
#[tokio::test]
async fn given_configured_session_when_disconnected_then_closed_with_reason() {
    // GIVEN: A configured session
    let mut harness = start(test_config());
    open_configured(&mut harness).await;

    // WHEN: Disconnecting
    harness
        .client
        .disconnect_normally()
        .await
        .expect("disconnect");

    // THEN: Close frame sent, session Closed with the same code and reason
    let expected = State::Closed {
        code: 1000,
        reason: "The user has closed the connection.".to_string(),
    };
    wait_for_state(&mut harness.events, expected.clone()).await;
    assert_eq!(
        harness.transport.closes(),
        vec![(1000, "The user has closed the connection.".to_string())]
    );
    assert_eq!(harness.client.state().await, expected);

    // AND: A closed session can connect again
    harness.client.connect().await.expect("reconnect");
    assert_eq!(harness.transport.open_count(), 2);
}

#[tokio::test]
async fn given_idle_client_when_disconnected_then_closed_without_socket() {
    let harness = start(test_config());

    harness
        .client
        .disconnect(1000, "not needed")
        .await
        .expect("disconnect");

    assert_eq!(
        harness.client.state().await,
        State::Closed {
            code: 1000,
            reason: "not needed".to_string(),
        }
    );
    assert!(harness.transport.closes().is_empty());
}

#[tokio::test]
async fn given_configured_session_when_conversation_cleared_then_closed_with_cleared_reason() {
    let mut harness = start(test_config());
    open_configured(&mut harness).await;
    harness
        .client
        .clear_conversation()
        .await
        .expect("clear_conversation");
    assert_eq!(harness.transport.last_sent()["message"]["type"], "Event");

    harness
        .transport
        .listener()
        .on_message(frame("message", "SessionClearedEvent", 200, json!({})));

    wait_for_event(&mut harness.events, |event| {
        matches!(event, Event::ConversationCleared)
    })
    .await;
    wait_for_state(
        &mut harness.events,
        State::Closed {
            code: 1000,
            reason: CONVERSATION_CLEARED_REASON.to_string(),
        },
    )
    .await;
}

/// **VALUE**: A rejected socket upgrade is fatal and reported as Forbidden.
///
/// **WHY THIS MATTERS**: Reconnecting against a 403 only hammers the server;
/// hosts must tell the user the deployment refused them.
///
/// **BUG THIS CATCHES**: Would catch access denied being treated as a
/// recoverable failure and entering Reconnecting.
#[tokio::test]
async fn given_connecting_when_access_denied_then_fatal_error_state() {
    // GIVEN: A connecting client
    let mut harness = start(test_config());
    harness.client.connect().await.expect("connect");

    // WHEN: The upgrade is rejected
    harness
        .transport
        .listener()
        .on_failure(TransportError::AccessDenied {
            message: "403 Forbidden".to_string(),
            location: ErrorLocation::from(Location::caller()),
        });

    // THEN: Error state, Forbidden event, and no way back via connect
    let event = wait_for_event(&mut harness.events, |event| matches!(event, Event::Error { .. }))
        .await;
    assert!(matches!(
        event,
        Event::Error {
            code: ErrorCode::WebsocketAccessDenied,
            corrective_action: CorrectiveAction::Forbidden,
            ..
        }
    ));
    assert!(harness.client.state().await.is_terminal());
    assert!(matches!(
        harness.client.connect().await,
        Err(SessionError::IllegalStateTransition { .. })
    ));
}

/// **VALUE**: A server logout clears auth and closes the session.
///
/// **BUG THIS CATCHES**: Would catch the token surviving a server-side logout,
/// which lets the next configure silently reuse a revoked JWT.
#[tokio::test]
async fn given_authenticated_session_when_logout_event_arrives_then_closed_and_auth_cleared() {
    // GIVEN: An authenticated, configured session
    let mut harness = start(test_config());
    open_authenticated(&mut harness).await;
    assert!(harness.client.was_authenticated());

    // WHEN: The host logs out and the server confirms
    harness.client.logout().await.expect("logout");
    harness
        .transport
        .listener()
        .on_message(frame("message", "LogoutEvent", 200, json!({})));

    // THEN: Closed with the logout reason, Logout event, auth forgotten
    wait_for_state(
        &mut harness.events,
        State::Closed {
            code: 1000,
            reason: LOGOUT_REASON.to_string(),
        },
    )
    .await;
    wait_for_event(&mut harness.events, |event| matches!(event, Event::Logout)).await;
    assert_eq!(harness.client.auth_jwt().await, None);
    assert!(!harness.client.was_authenticated());
    assert_eq!(harness.auth.counters.logouts.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.transport.closes(),
        vec![(1000, LOGOUT_REASON.to_string())]
    );
}

#[tokio::test]
async fn given_authenticated_session_when_configured_then_frame_carries_jwt() {
    let mut harness = start(test_config());

    open_authenticated(&mut harness).await;

    let configure = harness
        .transport
        .sent()
        .into_iter()
        .map(|raw| serde_json::from_str::<serde_json::Value>(&raw).unwrap())
        .find(|sent| sent["action"] == "configureAuthenticatedSession")
        .expect("no authenticated configure sent");
    assert_eq!(configure["data"]["code"], "jwt-1");
}

/// **VALUE**: A 401 on an authenticated session refreshes the token and
/// re-configures instead of surfacing an error.
///
/// **WHY THIS MATTERS**: JWTs expire during long conversations; the user
/// should not be asked to sign in again while a refresh token is held.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The 401 is surfaced as an error event despite auto-refresh
/// - The re-configure uses the stale JWT
/// - The refresh token is lost after refreshing
#[tokio::test]
async fn given_authenticated_session_when_unauthorized_then_token_refreshed_and_reconfigured() {
    // GIVEN: An authenticated, configured session
    let mut harness = start(test_config());
    open_authenticated(&mut harness).await;

    // WHEN: The server rejects the JWT
    harness.transport.listener().on_message(frame(
        "message",
        "StringMessage",
        401,
        json!("JWT expired"),
    ));

    // THEN: Refreshed JWT is announced without any error
    let events = collect_until(&mut harness.events, |event| {
        matches!(event, Event::Authenticated(_))
    })
    .await;
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, Event::Error { .. })),
        "{events:?}"
    );

    // THEN: The session was re-configured with the new JWT
    let sent = harness.transport.last_sent();
    assert_eq!(sent["action"], "configureAuthenticatedSession");
    assert_eq!(sent["data"]["code"], "refreshed-jwt-1");
    let held = harness.client.auth_jwt().await.expect("token held");
    assert_eq!(held.jwt.expose(), "refreshed-jwt-1");
    assert_eq!(
        held.refresh_token.as_ref().map(|token| token.expose()),
        Some("refresh-1")
    );
}

#[tokio::test]
async fn given_auto_refresh_disabled_when_unauthorized_then_error_event() {
    let mut config = test_config();
    config.auto_refresh_token_when_expired = false;
    let mut harness = start(config);
    open_authenticated(&mut harness).await;

    harness.transport.listener().on_message(frame(
        "message",
        "StringMessage",
        401,
        json!("JWT expired"),
    ));

    let event = wait_for_event(&mut harness.events, |event| matches!(event, Event::Error { .. }))
        .await;
    assert!(matches!(
        event,
        Event::Error {
            code: ErrorCode::ClientResponseError(401),
            corrective_action: CorrectiveAction::ReAuthenticate,
            ..
        }
    ));
    assert_eq!(harness.auth.counters.refreshes.load(Ordering::SeqCst), 0);
}
