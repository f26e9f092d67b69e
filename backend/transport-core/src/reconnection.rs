//! Reconnection policy: a fixed attempt budget and a constant delay.
//!
//! The handler never learns whether a reconnect worked. The session actor
//! swaps in a fresh handler when a connection reaches `Connected`, which is
//! what restores the budget.

use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;

pub const DEFAULT_RECONNECT_INTERVAL_MILLIS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectionConfig {
    pub max_attempts: u32,
    pub timeout_millis: u64,
}

impl ReconnectionConfig {
    /// One attempt every 3 seconds for the whole `secs` window.
    pub fn from_timeout_secs(secs: u64) -> Self {
        let max_attempts = u32::try_from(secs / 3).unwrap_or(u32::MAX);
        Self {
            max_attempts,
            timeout_millis: DEFAULT_RECONNECT_INTERVAL_MILLIS,
        }
    }
}

pub struct ReconnectionHandler {
    config: ReconnectionConfig,
    attempts_left: u32,
    backoff: ExponentialBackoff,
    pending: Vec<JoinHandle<()>>,
}

impl ReconnectionHandler {
    pub fn new(config: ReconnectionConfig) -> Self {
        let interval = Duration::from_millis(config.timeout_millis);
        let backoff = ExponentialBackoff {
            current_interval: interval,
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        Self {
            config,
            attempts_left: config.max_attempts,
            backoff,
            pending: Vec::new(),
        }
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    pub fn should_reconnect(&self) -> bool {
        self.attempts_left > 0
    }

    /// Schedule `action` after the reconnect interval.
    ///
    /// Returns immediately. With no attempts left nothing is scheduled and
    /// `false` is returned.
    pub fn reconnect<F>(&mut self, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.should_reconnect() {
            warn!(
                "Reconnect requested with no attempts left (budget {})",
                self.config.max_attempts
            );
            return false;
        }

        self.attempts_left -= 1;
        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(Duration::from_millis(self.config.timeout_millis));

        debug!(
            "Scheduling reconnect in {delay:?} ({} of {} attempts left)",
            self.attempts_left, self.config.max_attempts
        );

        self.pending.retain(|handle| !handle.is_finished());
        self.pending.push(tokio::spawn(async move {
            TokioSleep(delay).await;
            action();
        }));

        true
    }

    /// Abort scheduled actions that have not run yet.
    pub fn cancel_pending(&mut self) {
        for handle in self.pending.drain(..) {
            if !handle.is_finished() {
                debug!("Cancelling pending reconnect");
                handle.abort();
            }
        }
    }
}

impl Drop for ReconnectionHandler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
