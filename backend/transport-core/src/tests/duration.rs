use crate::duration::{
    Clock, DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS, SessionDurationState,
    SessionDurationTracker,
};
use crate::events::Event;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep as TokioSleep;

const NOW: i64 = 1_700_000_000;

struct FakeClock(AtomicI64);

impl Clock for FakeClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn tracker() -> (SessionDurationTracker, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let clock = Arc::new(FakeClock(AtomicI64::new(NOW)));
    (SessionDurationTracker::new(clock, Arc::new(tx)), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn notices(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, Event::SessionExpirationNotice { .. }))
        .count()
}

async fn settle(secs: u64) {
    TokioSleep(Duration::from_secs(secs)).await;
    tokio::task::yield_now().await;
}

#[tokio::test]
async fn given_new_tracker_when_snapshot_taken_then_defaults() {
    let (tracker, _rx) = tracker();

    assert_eq!(tracker.snapshot(), SessionDurationState::default());
    assert_eq!(
        tracker.snapshot().session_expiration_notice_interval_secs,
        DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS
    );
}

/// **VALUE**: The notice fires `interval` seconds before expiration, not at
/// expiration and not immediately.
///
/// **WHY THIS MATTERS**: The notice is the host's only chance to warn the
/// user before the session goes read-only.
///
/// **BUG THIS CATCHES**: Would catch the delay computed as `expiration - now`
/// without subtracting the interval.
#[tokio::test(start_paused = true)]
async fn given_future_expiration_when_updated_then_notice_fires_interval_before() {
    // GIVEN: A tracker and an expiration 10 minutes out
    let (mut tracker, mut rx) = tracker();

    // WHEN: Recording the expiration
    tracker.update_session_duration(Some(600), Some(NOW + 600));

    // THEN: Duration update now, no notice yet
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![Event::SessionDurationUpdated(SessionDurationState {
            session_expiration_notice_interval_secs: 60,
            duration_seconds: Some(600),
            expiration_date: Some(NOW + 600),
        })]
    );

    // WHEN: Just before the notice time
    settle(539).await;
    assert!(drain(&mut rx).is_empty());

    // THEN: The notice arrives at expiration - 60
    settle(2).await;
    assert_eq!(
        drain(&mut rx),
        vec![Event::SessionExpirationNotice {
            expiration_date: NOW + 600,
            notice_interval_secs: 60,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn given_expiration_inside_notice_window_when_updated_then_notice_is_immediate() {
    let (mut tracker, mut rx) = tracker();

    tracker.update_session_duration(None, Some(NOW + 30));

    let events = drain(&mut rx);
    assert_eq!(notices(&events), 1);
    assert!(events.contains(&Event::SessionExpirationNotice {
        expiration_date: NOW + 30,
        notice_interval_secs: 60,
    }));
}

/// **VALUE**: An expiration already in the past produces no notice at all.
///
/// **BUG THIS CATCHES**: Would catch a saturating delay of zero firing a
/// stale notice for a session that already ended.
#[tokio::test(start_paused = true)]
async fn given_past_expiration_when_updated_then_no_notice() {
    // GIVEN: A tracker
    let (mut tracker, mut rx) = tracker();

    // WHEN: The server reports an expiration in the past
    tracker.update_session_duration(None, Some(NOW - 1));
    settle(3600).await;

    // THEN: Only the duration update
    let events = drain(&mut rx);
    assert_eq!(notices(&events), 0);
    assert_eq!(events.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn given_same_values_when_updated_again_then_no_event() {
    let (mut tracker, mut rx) = tracker();
    tracker.update_session_duration(Some(600), Some(NOW + 600));
    drain(&mut rx);

    tracker.update_session_duration(Some(600), Some(NOW + 600));
    tracker.update_session_duration(None, None);

    assert!(drain(&mut rx).is_empty());
    assert_eq!(tracker.snapshot().duration_seconds, Some(600));
}

/// **VALUE**: Negative intervals fall back to the default.
#[tokio::test]
async fn given_negative_interval_when_set_then_default_is_used() {
    // GIVEN: A tracker with a custom interval
    let (mut tracker, mut rx) = tracker();
    tracker.set_session_expiration_notice_interval(120);
    assert_eq!(tracker.snapshot().session_expiration_notice_interval_secs, 120);

    // WHEN: Setting a negative interval
    tracker.set_session_expiration_notice_interval(-5);

    // THEN: Back to 60, with an update for each change
    assert_eq!(
        tracker.snapshot().session_expiration_notice_interval_secs,
        DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS
    );
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn given_pending_notice_when_interval_changed_then_notice_is_rescheduled() {
    let (mut tracker, mut rx) = tracker();
    tracker.update_session_duration(None, Some(NOW + 600));
    drain(&mut rx);

    tracker.set_session_expiration_notice_interval(300);
    drain(&mut rx);

    settle(301).await;
    assert_eq!(
        drain(&mut rx),
        vec![Event::SessionExpirationNotice {
            expiration_date: NOW + 600,
            notice_interval_secs: 300,
        }]
    );
}

/// **VALUE**: Clearing cancels the pending notice.
///
/// **BUG THIS CATCHES**: Would catch a notice for a closed session arriving
/// after the host already moved on.
#[tokio::test(start_paused = true)]
async fn given_pending_notice_when_cleared_then_no_notice_and_values_reset() {
    // GIVEN: A scheduled notice
    let (mut tracker, mut rx) = tracker();
    tracker.update_session_duration(Some(600), Some(NOW + 600));
    drain(&mut rx);

    // WHEN: Clearing and waiting past the notice time
    tracker.clear();
    settle(700).await;

    // THEN: One reset update, no notice
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![Event::SessionDurationUpdated(SessionDurationState::default())]
    );
    assert_eq!(tracker.snapshot(), SessionDurationState::default());
}

#[tokio::test]
async fn given_empty_tracker_when_cleared_then_no_event() {
    let (mut tracker, mut rx) = tracker();

    tracker.clear();

    assert!(drain(&mut rx).is_empty());
}
