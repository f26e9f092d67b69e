use crate::reconnection::{
    DEFAULT_RECONNECT_INTERVAL_MILLIS, ReconnectionConfig, ReconnectionHandler,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::sleep as TokioSleep;

fn counting_action(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

async fn settle(millis: u64) {
    TokioSleep(Duration::from_millis(millis)).await;
    tokio::task::yield_now().await;
}

#[test]
fn given_default_timeout_when_converted_then_one_attempt_per_interval() {
    let config = ReconnectionConfig::from_timeout_secs(300);

    assert_eq!(
        config,
        ReconnectionConfig {
            max_attempts: 100,
            timeout_millis: DEFAULT_RECONNECT_INTERVAL_MILLIS,
        }
    );
    assert_eq!(ReconnectionConfig::from_timeout_secs(2).max_attempts, 0);
}

/// **VALUE**: A budget of N runs the action exactly N times.
///
/// **WHY THIS MATTERS**: The session closes for good once reconnects run out;
/// an off-by-one either hammers the server or gives up one attempt early.
///
/// **BUG THIS CATCHES**: Would catch a decrement after the budget check, or
/// a later schedule cancelling an earlier one.
#[tokio::test(start_paused = true)]
async fn given_budget_of_three_when_reconnect_called_four_times_then_action_runs_three_times() {
    // GIVEN: A handler with three attempts
    let mut handler = ReconnectionHandler::new(ReconnectionConfig {
        max_attempts: 3,
        timeout_millis: 1000,
    });
    let counter = Arc::new(AtomicUsize::new(0));

    // WHEN: Asking for four reconnects
    let accepted: Vec<bool> = (0..4)
        .map(|_| handler.reconnect(counting_action(&counter)))
        .collect();
    settle(1001).await;

    // THEN: Three accepted, three runs, nothing left
    assert_eq!(accepted, vec![true, true, true, false]);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(handler.attempts_left(), 0);
    assert!(!handler.should_reconnect());
}

/// **VALUE**: The action waits for the configured interval.
///
/// **BUG THIS CATCHES**: Would catch the delay being dropped (tight reconnect
/// loop) or growing exponentially.
#[tokio::test(start_paused = true)]
async fn given_scheduled_reconnect_when_interval_not_elapsed_then_action_has_not_run() {
    // GIVEN: A reconnect scheduled with the default interval
    let mut handler = ReconnectionHandler::new(ReconnectionConfig::from_timeout_secs(30));
    let counter = Arc::new(AtomicUsize::new(0));
    assert!(handler.reconnect(counting_action(&counter)));

    // WHEN: Just short of the interval
    settle(DEFAULT_RECONNECT_INTERVAL_MILLIS - 1).await;

    // THEN: Not yet run
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    // WHEN: The interval passes
    settle(2).await;

    // THEN: Run once
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn given_second_reconnect_when_scheduled_then_delay_stays_constant() {
    let mut handler = ReconnectionHandler::new(ReconnectionConfig {
        max_attempts: 5,
        timeout_millis: 500,
    });
    let counter = Arc::new(AtomicUsize::new(0));

    handler.reconnect(counting_action(&counter));
    settle(501).await;
    handler.reconnect(counting_action(&counter));
    settle(499).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    settle(2).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

/// **VALUE**: Cancelling drops scheduled actions before they run.
///
/// **WHY THIS MATTERS**: A host disconnect during backoff must not be
/// followed by a surprise reconnect three seconds later.
#[tokio::test(start_paused = true)]
async fn given_pending_reconnect_when_cancelled_then_action_never_runs() {
    // GIVEN: Two pending reconnects
    let mut handler = ReconnectionHandler::new(ReconnectionConfig {
        max_attempts: 5,
        timeout_millis: 1000,
    });
    let counter = Arc::new(AtomicUsize::new(0));
    handler.reconnect(counting_action(&counter));
    handler.reconnect(counting_action(&counter));

    // WHEN: Cancelling before the interval passes
    handler.cancel_pending();
    settle(5000).await;

    // THEN: Neither ran, and the spent budget is not refunded
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(handler.attempts_left(), 3);
}

#[tokio::test(start_paused = true)]
async fn given_pending_reconnect_when_handler_dropped_then_action_never_runs() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let mut handler = ReconnectionHandler::new(ReconnectionConfig {
            max_attempts: 1,
            timeout_millis: 1000,
        });
        handler.reconnect(counting_action(&counter));
    }

    settle(2000).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
