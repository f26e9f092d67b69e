// Unit tests for stdin command parsing and dispatch

use crate::commands::{ConsoleCommand, HELP, execute, follow_up, parse};
use crate::error::ConsoleError;

use transport_core::auth::HttpAuthApi;
use transport_core::config::MessengerConfig;
use transport_core::events::Event;
use transport_core::session::{MessagingClient, State};
use transport_core::store::InMemoryStore;
use transport_core::transport::WebSocketTransport;

use std::sync::Arc;

/// **VALUE**: Every documented command parses to its variant.
///
/// **BUG THIS CATCHES**: Would catch a command listed in `/help` that the
/// parser no longer recognises and silently sends as chat text instead.
#[test]
fn given_command_lines_when_parsed_then_expected_commands() {
    let cases = [
        ("/connect", ConsoleCommand::Connect),
        ("/configure", ConsoleCommand::Configure),
        ("/configure-auth", ConsoleCommand::ConfigureAuthenticated),
        ("/refresh", ConsoleCommand::Refresh),
        ("/logout", ConsoleCommand::Logout),
        ("/health", ConsoleCommand::Health),
        ("/clear", ConsoleCommand::Clear),
        ("/delete att-1", ConsoleCommand::Delete("att-1".to_string())),
        ("/notice 120", ConsoleCommand::Notice(120)),
        ("/notice -1", ConsoleCommand::Notice(-1)),
        ("/state", ConsoleCommand::State),
        ("/disconnect", ConsoleCommand::Disconnect),
        ("/help", ConsoleCommand::Help),
        ("/quit", ConsoleCommand::Quit),
        ("/exit", ConsoleCommand::Quit),
        ("  /health  ", ConsoleCommand::Health),
    ];

    for (line, expected) in cases {
        assert_eq!(parse(line).unwrap(), Some(expected), "line {line:?}");
    }
}

#[test]
fn given_auth_line_when_parsed_then_grant_parts_extracted() {
    assert_eq!(
        parse("/auth code-1 https://example.test/cb").unwrap(),
        Some(ConsoleCommand::Authenticate {
            auth_code: "code-1".to_string(),
            redirect_uri: "https://example.test/cb".to_string(),
            code_verifier: None,
        })
    );
    assert_eq!(
        parse("/auth code-1 https://example.test/cb verifier").unwrap(),
        Some(ConsoleCommand::Authenticate {
            auth_code: "code-1".to_string(),
            redirect_uri: "https://example.test/cb".to_string(),
            code_verifier: Some("verifier".to_string()),
        })
    );
}

#[test]
fn given_plain_text_when_parsed_then_sent_as_message() {
    assert_eq!(
        parse("  hello there  ").unwrap(),
        Some(ConsoleCommand::Send("hello there".to_string()))
    );
}

#[test]
fn given_blank_line_when_parsed_then_nothing() {
    assert_eq!(parse("").unwrap(), None);
    assert_eq!(parse("   ").unwrap(), None);
}

#[test]
fn given_malformed_commands_when_parsed_then_usage_errors() {
    for line in ["/auth", "/auth only-code", "/delete", "/notice soon", "/bogus", "/"] {
        let result = parse(line);
        assert!(
            matches!(result, Err(ConsoleError::Usage { .. })),
            "line {line:?} gave {result:?}"
        );
    }
}

/// **VALUE**: A new socket is configured without user input, in the right
/// mode; a reconnected one is left to the engine.
///
/// **BUG THIS CATCHES**: Would catch the console re-configuring after a
/// reconnect, which sends a second configure the server answers twice.
#[test]
fn given_connected_events_when_follow_up_checked_then_configure_only_after_connecting() {
    // GIVEN
    let opened = Event::StateChanged {
        old: State::Connecting,
        new: State::Connected,
    };
    let reopened = Event::StateChanged {
        old: State::Reconnecting,
        new: State::Connected,
    };

    // WHEN/THEN
    assert_eq!(follow_up(&opened, false), Some(ConsoleCommand::Configure));
    assert_eq!(
        follow_up(&opened, true),
        Some(ConsoleCommand::ConfigureAuthenticated)
    );
    assert_eq!(follow_up(&reopened, false), None);
    assert_eq!(follow_up(&Event::HealthChecked, false), None);
}

fn idle_client() -> MessagingClient {
    let config = MessengerConfig::new("dep-1", "example.test");
    let api = HttpAuthApi::new(config.api_base_url().unwrap(), &config.deployment_id).unwrap();
    let (client, _events) = MessagingClient::new(
        config,
        Arc::new(WebSocketTransport::new()),
        api,
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();
    client
}

#[tokio::test]
async fn given_idle_client_when_local_commands_executed_then_text_returned() {
    let client = idle_client();

    let state = execute(&client, ConsoleCommand::State).await.unwrap();
    let help = execute(&client, ConsoleCommand::Help).await.unwrap();

    assert_eq!(state.as_deref(), Some("Idle"));
    assert_eq!(help.as_deref(), Some(HELP));
}

/// **VALUE**: Commands the session rejects come back as printable errors.
///
/// **WHY THIS MATTERS**: Typing before the session is configured is the most
/// common mistake; it must print a reason, not end the input loop.
#[tokio::test]
async fn given_idle_client_when_message_sent_then_session_error() {
    // GIVEN: A client that never connected
    let client = idle_client();

    // WHEN: Sending chat text
    let result = execute(&client, ConsoleCommand::Send("hello".to_string())).await;

    // THEN: A session error naming the rejection
    assert!(
        matches!(result, Err(ConsoleError::Session { .. })),
        "got {result:?}"
    );
}
