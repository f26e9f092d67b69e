//! Session transport engine for a web-messaging backend.
//!
//! The engine keeps one authenticated, message-oriented session alive over a
//! single socket. It is built from small pieces that only meet in the session
//! actor:
//!
//! - [`codec`]: `messageClass`-tagged JSON envelopes to typed [`codec::WireMessage`]s
//! - [`reconnection`]: attempt budget + timer for reconnects
//! - [`auth`]: JWT acquisition, refresh and logout over an [`auth::AuthApi`]
//! - [`duration`]: session expiration tracking and notices
//! - [`session`]: the state machine, the actor that owns it, and the host handle
//! - [`transport`]: the socket capability the actor drives
//!
//! Hosts talk to [`session::MessagingClient`] and read [`events::Event`]s from
//! the stream returned alongside it.

pub mod auth;
pub mod codec;
pub mod config;
pub mod duration;
pub mod error;
pub mod events;
pub mod reconnection;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod tests;

pub const WEB_SOCKET_URL_PREFIX: &str = const_format::concatcp!("wss://", "webmessaging.");
pub const WEB_SOCKET_PATH: &str = "/v1";
pub const API_URL_PREFIX: &str = const_format::concatcp!("https://", "api.");
pub const DEPLOYMENTS_API_PATH: &str = "/api/v2/webdeployments/";
pub const DEPLOYMENT_ID_QUERY_KEY: &str = "deploymentId";

/// Normal closure code used for host-initiated and server-requested closes.
pub const NORMAL_CLOSURE_CODE: u16 = 1000;
/// Abnormal closure code used when the engine gives up on a connection.
pub const ABNORMAL_CLOSURE_CODE: u16 = 1006;
