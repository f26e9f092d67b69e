//! Session-duration tracking and expiration notices.
//!
//! The server advertises how long a session lives (`durationSeconds`) and
//! when it ends (`expirationDate`, epoch seconds). The tracker records both
//! and raises [`Event::SessionExpirationNotice`] `notice_interval` seconds
//! before expiration. It is owned by the session actor; hosts read
//! [`SessionDurationState`] snapshots.

use crate::events::{Event, EventSink};

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, trace};
use tokio::task::JoinHandle;
use tokio::time::sleep as TokioSleep;

pub const DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS: i64 = 60;

/// Wall-clock source in epoch seconds.
pub trait Clock: Send + Sync + 'static {
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDurationState {
    pub session_expiration_notice_interval_secs: i64,
    pub duration_seconds: Option<i64>,
    pub expiration_date: Option<i64>,
}

impl Default for SessionDurationState {
    fn default() -> Self {
        Self {
            session_expiration_notice_interval_secs:
                DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS,
            duration_seconds: None,
            expiration_date: None,
        }
    }
}

pub struct SessionDurationTracker {
    state: SessionDurationState,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    pending_notice: Option<JoinHandle<()>>,
}

impl SessionDurationTracker {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: SessionDurationState::default(),
            clock,
            sink,
            pending_notice: None,
        }
    }

    pub fn snapshot(&self) -> SessionDurationState {
        self.state
    }

    /// Record server-advertised duration metadata. `None` leaves a field as is.
    pub fn update_session_duration(
        &mut self,
        duration_seconds: Option<i64>,
        expiration_date: Option<i64>,
    ) {
        let mut changed = false;

        if let Some(duration) = duration_seconds
            && self.state.duration_seconds != Some(duration)
        {
            self.state.duration_seconds = Some(duration);
            changed = true;
        }

        if let Some(expiration) = expiration_date
            && self.state.expiration_date != Some(expiration)
        {
            self.state.expiration_date = Some(expiration);
            changed = true;
            self.schedule_notice();
        }

        if changed {
            self.sink.emit(Event::SessionDurationUpdated(self.state));
        }
    }

    /// Negative values fall back to the default.
    pub fn set_session_expiration_notice_interval(&mut self, secs: i64) {
        let interval = if secs < 0 {
            DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS
        } else {
            secs
        };

        if interval == self.state.session_expiration_notice_interval_secs {
            return;
        }

        self.state.session_expiration_notice_interval_secs = interval;
        if self.state.expiration_date.is_some() {
            self.schedule_notice();
        }
        self.sink.emit(Event::SessionDurationUpdated(self.state));
    }

    pub fn clear(&mut self) {
        self.cancel_notice();
        let had_values =
            self.state.duration_seconds.is_some() || self.state.expiration_date.is_some();
        self.state.duration_seconds = None;
        self.state.expiration_date = None;

        if had_values {
            self.sink.emit(Event::SessionDurationUpdated(self.state));
        }
    }

    fn schedule_notice(&mut self) {
        self.cancel_notice();

        let Some(expiration_date) = self.state.expiration_date else {
            return;
        };
        let interval = self.state.session_expiration_notice_interval_secs;
        let now = self.clock.now_epoch_secs();

        if expiration_date <= now {
            debug!("Session expiration {expiration_date} already passed, no notice scheduled");
            return;
        }

        let notice = Event::SessionExpirationNotice {
            expiration_date,
            notice_interval_secs: interval,
        };
        let notice_at = expiration_date.saturating_sub(interval);

        if notice_at <= now {
            trace!("Expiration notice time already reached, notifying now");
            self.sink.emit(notice);
            return;
        }

        let delay = Duration::from_secs(notice_at.abs_diff(now));
        debug!("Expiration notice scheduled in {delay:?}");

        let sink = Arc::clone(&self.sink);
        self.pending_notice = Some(tokio::spawn(async move {
            TokioSleep(delay).await;
            sink.emit(notice);
        }));
    }

    fn cancel_notice(&mut self) {
        if let Some(handle) = self.pending_notice.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionDurationTracker {
    fn drop(&mut self) {
        self.cancel_notice();
    }
}
