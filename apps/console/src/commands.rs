//! Stdin lines to session commands.
//!
//! Lines starting with `/` are commands, anything else is sent as a chat
//! message. Blank lines are ignored.

use crate::error::ConsoleError;

use transport_core::events::Event;
use transport_core::session::{MessagingClient, State};

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::panic::Location;

use log::debug;

const COMMAND_PREFIX: char = '/';

pub const HELP: &str = "\
/connect                         open the socket
/configure                       configure an anonymous session
/auth <code> <redirect> [verifier]  exchange an auth code for a JWT
/configure-auth                  configure with the held JWT
/refresh                         refresh the JWT
/logout                          end the authenticated session
/health                          send a health check
/clear                           clear the conversation
/delete <attachment-id>          delete an uploaded attachment
/notice <secs>                   set the expiration notice interval
/state                           print the session state
/disconnect                      close the session
/quit                            disconnect and exit
<text>                           send a message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect,
    Configure,
    ConfigureAuthenticated,
    Authenticate {
        auth_code: String,
        redirect_uri: String,
        code_verifier: Option<String>,
    },
    Refresh,
    Logout,
    Health,
    Clear,
    Delete(String),
    Notice(i64),
    State,
    Disconnect,
    Help,
    Quit,
    Send(String),
}

#[track_caller]
fn usage(message: impl Into<String>) -> ConsoleError {
    ConsoleError::Usage {
        message: message.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Parse one stdin line. `Ok(None)` for blank input.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix(COMMAND_PREFIX) else {
        return Ok(Some(ConsoleCommand::Send(line.to_string())));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("connect", []) => ConsoleCommand::Connect,
        ("configure", []) => ConsoleCommand::Configure,
        ("configure-auth", []) => ConsoleCommand::ConfigureAuthenticated,
        ("auth", [auth_code, redirect_uri]) => ConsoleCommand::Authenticate {
            auth_code: auth_code.to_string(),
            redirect_uri: redirect_uri.to_string(),
            code_verifier: None,
        },
        ("auth", [auth_code, redirect_uri, code_verifier]) => ConsoleCommand::Authenticate {
            auth_code: auth_code.to_string(),
            redirect_uri: redirect_uri.to_string(),
            code_verifier: Some(code_verifier.to_string()),
        },
        ("auth", _) => return Err(usage("/auth <code> <redirect> [verifier]")),
        ("refresh", []) => ConsoleCommand::Refresh,
        ("logout", []) => ConsoleCommand::Logout,
        ("health", []) => ConsoleCommand::Health,
        ("clear", []) => ConsoleCommand::Clear,
        ("delete", [attachment_id]) => ConsoleCommand::Delete(attachment_id.to_string()),
        ("delete", _) => return Err(usage("/delete <attachment-id>")),
        ("notice", [secs]) => ConsoleCommand::Notice(
            secs.parse()
                .map_err(|_| usage(format!("`{secs}` is not a number of seconds")))?,
        ),
        ("notice", _) => return Err(usage("/notice <secs>")),
        ("state", []) => ConsoleCommand::State,
        ("disconnect", []) => ConsoleCommand::Disconnect,
        ("help", _) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => return Err(usage(format!("unknown command `{line}`, try /help"))),
    };

    Ok(Some(command))
}

/// Command to run on its own after `event`.
///
/// A freshly opened socket is configured straight away, with the JWT when
/// one is held. Sockets reopened by a reconnect are re-configured by the
/// engine itself.
pub fn follow_up(event: &Event, authenticated: bool) -> Option<ConsoleCommand> {
    match event {
        Event::StateChanged {
            old: State::Connecting,
            new: State::Connected,
        } if authenticated => Some(ConsoleCommand::ConfigureAuthenticated),
        Event::StateChanged {
            old: State::Connecting,
            new: State::Connected,
        } => Some(ConsoleCommand::Configure),
        _ => None,
    }
}

/// Run a command against the session. `Quit` disconnects; the caller ends
/// the input loop.
///
/// Returns text to print for commands that answer locally.
pub async fn execute(
    client: &MessagingClient,
    command: ConsoleCommand,
) -> Result<Option<String>, ConsoleError> {
    debug!("Executing {command:?}");

    let result = match command {
        ConsoleCommand::Connect => client.connect().await,
        ConsoleCommand::Configure => client.configure_session().await,
        ConsoleCommand::ConfigureAuthenticated => client.configure_authenticated_session().await,
        ConsoleCommand::Authenticate {
            auth_code,
            redirect_uri,
            code_verifier,
        } => {
            client
                .authenticate(auth_code, redirect_uri, code_verifier)
                .await
        }
        ConsoleCommand::Refresh => client.refresh_token().await,
        ConsoleCommand::Logout => client.logout().await,
        ConsoleCommand::Health => client.health_check().await,
        ConsoleCommand::Clear => client.clear_conversation().await,
        ConsoleCommand::Delete(attachment_id) => client.delete_attachment(attachment_id).await,
        ConsoleCommand::Notice(secs) => client.set_session_expiration_notice_interval(secs).await,
        ConsoleCommand::Disconnect | ConsoleCommand::Quit => client.disconnect_normally().await,
        ConsoleCommand::Send(text) => client.send_message(text, BTreeMap::new()).await,
        ConsoleCommand::State => return Ok(Some(format!("{:?}", client.state().await))),
        ConsoleCommand::Help => return Ok(Some(HELP.to_string())),
    };

    result.map(|()| None).map_err(|e| ConsoleError::Session {
        message: e.to_string(),
        location: ErrorLocation::from(Location::caller()),
    })
}
