use crate::error::SessionError;
use crate::events::{Event, EventSink};
use crate::session::state::{Signal, State, transition};

use std::mem;
use std::sync::Arc;

use log::debug;

/// The transition table plus the bookkeeping it cannot hold itself.
///
/// Tracks whether the current connection came from a reconnect so the next
/// `Configured` can say so, and emits [`Event::StateChanged`] for every
/// accepted transition.
pub struct StateMachine {
    state: State,
    was_reconnecting: bool,
    sink: Arc<dyn EventSink>,
}

impl StateMachine {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: State::Idle,
            was_reconnecting: false,
            sink,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Apply `signal`. A rejected signal leaves the state untouched.
    #[track_caller]
    pub fn apply(&mut self, signal: Signal) -> Result<&State, SessionError> {
        let Some(mut next) = transition(&self.state, &signal) else {
            return Err(SessionError::illegal_transition(self.state.clone(), signal));
        };

        match (&self.state, &mut next) {
            (State::Reconnecting, State::Connected) => self.was_reconnecting = true,
            (_, State::Configured {
                was_reconnecting, ..
            }) => *was_reconnecting = mem::take(&mut self.was_reconnecting),
            (_, State::Closed { .. } | State::Error { .. }) => self.was_reconnecting = false,
            _ => {}
        }

        let old = mem::replace(&mut self.state, next);
        debug!("State {old:?} -> {:?} on {signal:?}", self.state);
        self.sink.emit(Event::StateChanged {
            old,
            new: self.state.clone(),
        });

        Ok(&self.state)
    }
}
