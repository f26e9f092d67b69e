//! Session lifecycle: the transition table, the state machine that wraps it,
//! the actor that drives it and the host-facing [`MessagingClient`].

mod actor;
pub mod client;
pub mod machine;
pub mod state;

pub use client::MessagingClient;
pub use machine::StateMachine;
pub use state::{Signal, State, transition};
