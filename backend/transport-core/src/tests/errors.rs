use crate::error::{AuthError, DecodeError, SessionError, TransportError};
use crate::events::ErrorCode;
use crate::session::{Signal, State};

use std::io::{Error as IoError, ErrorKind};

use tokio_tungstenite::tungstenite::Error as WsError;

/// **VALUE**: An unreachable network is reported as such, not as a generic
/// socket error.
///
/// **WHY THIS MATTERS**: Hosts show "you are offline" for NetworkDisabled and
/// a generic retry message otherwise.
#[test]
fn given_unreachable_network_when_classified_then_network_unavailable() {
    // GIVEN: An I/O failure from the connector
    let error = WsError::Io(IoError::new(ErrorKind::NetworkUnreachable, "no route"));

    // WHEN: Classifying
    let transport = TransportError::from_tungstenite(&error);

    // THEN: NetworkDisabled, which is recoverable
    assert!(matches!(transport, TransportError::NetworkUnavailable { .. }));
    assert_eq!(transport.error_code(), ErrorCode::NetworkDisabled);
    assert!(transport.error_code().is_recoverable());
}

#[test]
fn given_other_socket_failures_when_classified_then_websocket_error() {
    let refused = WsError::Io(IoError::new(ErrorKind::ConnectionRefused, "refused"));

    let transport = TransportError::from_tungstenite(&refused);

    assert!(matches!(transport, TransportError::Connect { .. }));
    assert_eq!(transport.error_code(), ErrorCode::WebsocketError);
    assert_eq!(TransportError::read("eof").error_code(), ErrorCode::WebsocketError);
    assert_eq!(
        TransportError::not_connected().error_code(),
        ErrorCode::WebsocketError
    );
}

#[test]
fn given_auth_errors_when_categorised_then_category_and_status_match() {
    let rejected = AuthError::from_http_response("token refresh", 401, "expired");
    let server = AuthError::from_http_response("token exchange", 503, "down");

    assert_eq!(rejected.error_category(), "client_error");
    assert_eq!(rejected.status_code(), Some(401));
    assert_eq!(server.error_category(), "server_error");
    assert_eq!(AuthError::cancelled().error_category(), "cancelled");
    assert!(AuthError::cancelled().is_cancellation());
    assert!(!rejected.is_cancellation());
    assert_eq!(AuthError::missing_token("none").status_code(), None);
}

/// **VALUE**: Error messages point at the line that raised them.
///
/// **BUG THIS CATCHES**: Would catch a constructor losing `#[track_caller]`,
/// which makes every error report the constructor's own line.
#[test]
fn given_error_built_here_when_displayed_then_location_is_this_file() {
    // GIVEN / WHEN: Errors constructed in this test
    let decode = DecodeError::unknown_class("Mystery");
    let session = SessionError::illegal_transition(State::Idle, Signal::SocketOpened);

    // THEN: Their Display names this file
    let file = file!();
    assert!(decode.to_string().contains(file), "{decode}");
    assert!(session.to_string().contains(file), "{session}");
    assert!(decode.to_string().starts_with("Unknown Message Class Error: 'Mystery'"));
}

#[test]
fn given_invalid_url_when_converted_then_endpoint_error() {
    let error: AuthError = url::Url::parse("not a url").unwrap_err().into();

    assert_eq!(error.error_category(), "endpoint");
}
