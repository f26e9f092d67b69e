use crate::auth::{AuthApi, AuthCodeGrant, AuthHandler, AuthJwt};
use crate::error::AuthError;
use crate::events::{CorrectiveAction, ErrorCode, Event};
use crate::store::{InMemoryStore, KeyValueStore, previously_authorized_key};

use common::RedactedToken;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep as TokioSleep;

const DEPLOYMENT_ID: &str = "dep-1";

/// Counts calls and answers `jwt-{n}` after `delay`.
struct MockAuthApi {
    delay: Duration,
    failure: Mutex<Option<AuthError>>,
    exchanges: AtomicUsize,
    refreshes: AtomicUsize,
    logouts: AtomicUsize,
}

impl MockAuthApi {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            failure: Mutex::new(None),
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
        }
    }

    fn failing(self, error: AuthError) -> Self {
        *self.failure.lock().unwrap() = Some(error);
        self
    }

    fn failure(&self) -> Option<AuthError> {
        self.failure.lock().unwrap().clone()
    }
}

impl AuthApi for MockAuthApi {
    async fn fetch_auth_jwt(&self, _grant: AuthCodeGrant) -> Result<AuthJwt, AuthError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        TokioSleep(self.delay).await;
        match self.failure() {
            Some(error) => Err(error),
            None => Ok(AuthJwt::new(format!("jwt-{n}"), Some(format!("refresh-{n}")))),
        }
    }

    async fn logout(&self, _jwt: RedactedToken) -> Result<(), AuthError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        TokioSleep(self.delay).await;
        match self.failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn refresh_auth_token(
        &self,
        _refresh_token: RedactedToken,
    ) -> Result<RedactedToken, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        TokioSleep(self.delay).await;
        match self.failure() {
            Some(error) => Err(error),
            None => Ok(RedactedToken::new(format!("refreshed-jwt-{n}"))),
        }
    }
}

struct Fixture {
    api: Arc<MockAuthApi>,
    store: Arc<InMemoryStore>,
    handler: AuthHandler<MockAuthApi>,
    events: mpsc::UnboundedReceiver<Event>,
}

fn fixture(api: MockAuthApi) -> Fixture {
    let api = Arc::new(api);
    let store = Arc::new(InMemoryStore::new());
    let (tx, events) = mpsc::unbounded_channel();
    let handler = AuthHandler::new(
        Arc::clone(&api),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::new(tx),
        DEPLOYMENT_ID,
    );
    Fixture {
        api,
        store,
        handler,
        events,
    }
}

fn grant(code: &str) -> AuthCodeGrant {
    AuthCodeGrant {
        auth_code: RedactedToken::new(code),
        redirect_uri: "https://example.com/callback".to_string(),
        code_verifier: None,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn settle(millis: u64) {
    TokioSleep(Duration::from_millis(millis)).await;
    tokio::task::yield_now().await;
}

/// **VALUE**: A successful exchange stores the token, persists the flag and
/// emits exactly one Authenticated.
#[tokio::test(start_paused = true)]
async fn given_successful_exchange_when_authenticating_then_token_stored_and_flag_set() {
    // GIVEN: An API that answers after 100ms
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(100)));

    // WHEN: Authenticating
    f.handler.authenticate(grant("code-1"));
    settle(150).await;

    // THEN: Token held, flag persisted, one event
    let expected = AuthJwt::new("jwt-1", Some("refresh-1".to_string()));
    assert_eq!(f.handler.auth_jwt().await, Some(expected.clone()));
    assert!(f.handler.was_authenticated());
    assert_eq!(
        f.store.get(&previously_authorized_key(DEPLOYMENT_ID)).unwrap(),
        Some("true".to_string())
    );
    assert_eq!(drain(&mut f.events), vec![Event::Authenticated(expected)]);
}

#[tokio::test(start_paused = true)]
async fn given_failing_exchange_when_authenticating_then_one_auth_failed_error() {
    let mut f = fixture(
        MockAuthApi::new(Duration::from_millis(10))
            .failing(AuthError::from_http_response("token exchange", 400, "bad code")),
    );

    f.handler.authenticate(grant("code-1"));
    settle(50).await;

    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Error {
            code: ErrorCode::AuthFailed,
            corrective_action: CorrectiveAction::ReAuthenticate,
            ..
        }
    ));
    assert_eq!(f.handler.auth_jwt().await, None);
    assert!(!f.handler.was_authenticated());
}

/// **VALUE**: A second authenticate supersedes the first silently.
///
/// **WHY THIS MATTERS**: Users double-click sign-in buttons; the first,
/// abandoned exchange must neither overwrite the token nor show an error.
///
/// **BUG THIS CATCHES**: Would catch cancellation being reported as an
/// AuthFailed error, or a late first response replacing jwt-2.
#[tokio::test(start_paused = true)]
async fn given_in_flight_exchange_when_authenticating_again_then_only_second_result_lands() {
    // GIVEN: A slow exchange in flight
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(100)));
    f.handler.authenticate(grant("code-1"));
    settle(10).await;

    // WHEN: A second exchange supersedes it
    f.handler.authenticate(grant("code-2"));
    settle(200).await;

    // THEN: Only jwt-2, no error events
    let events = drain(&mut f.events);
    assert_eq!(
        events,
        vec![Event::Authenticated(AuthJwt::new(
            "jwt-2",
            Some("refresh-2".to_string())
        ))]
    );
    assert_eq!(f.api.exchanges.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn given_api_reports_cancellation_when_authenticating_then_no_event() {
    let mut f = fixture(MockAuthApi::new(Duration::ZERO).failing(AuthError::cancelled()));

    f.handler.authenticate(grant("code-1"));
    settle(10).await;

    assert!(drain(&mut f.events).is_empty());
}

/// **VALUE**: Refresh without a refresh token makes no network call.
#[tokio::test(start_paused = true)]
async fn given_no_token_when_refreshing_then_no_request() {
    // GIVEN: A handler that never authenticated
    let mut f = fixture(MockAuthApi::new(Duration::ZERO));

    // WHEN: Refreshing
    f.handler.refresh_token().await;
    settle(10).await;

    // THEN: Nothing happened
    assert_eq!(f.api.refreshes.load(Ordering::SeqCst), 0);
    assert!(drain(&mut f.events).is_empty());
}

/// **VALUE**: A refresh swaps the JWT and keeps the refresh token.
///
/// **BUG THIS CATCHES**: Would catch the refreshed pair dropping the refresh
/// token, which makes the next 401 unrecoverable.
#[tokio::test(start_paused = true)]
async fn given_authenticated_when_refreshing_then_new_jwt_with_original_refresh_token() {
    // GIVEN: An authenticated handler
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(10)));
    f.handler.authenticate(grant("code-1"));
    settle(20).await;
    drain(&mut f.events);

    // WHEN: Refreshing
    f.handler.refresh_token().await;
    settle(20).await;

    // THEN: New JWT, original refresh token
    let expected = AuthJwt::new("refreshed-jwt-1", Some("refresh-1".to_string()));
    assert_eq!(f.handler.auth_jwt().await, Some(expected.clone()));
    assert_eq!(drain(&mut f.events), vec![Event::Authenticated(expected)]);
}

#[tokio::test(start_paused = true)]
async fn given_refresh_rejected_when_refreshing_then_refresh_failure_error_and_token_kept() {
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(10)));
    f.handler.authenticate(grant("code-1"));
    settle(20).await;
    drain(&mut f.events);
    *f.api.failure.lock().unwrap() =
        Some(AuthError::from_http_response("token refresh", 401, "expired"));

    f.handler.refresh_token().await;
    settle(20).await;

    let events = drain(&mut f.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::Error {
            code: ErrorCode::RefreshAuthTokenFailure,
            ..
        }
    ));
    assert_eq!(
        f.handler.auth_jwt().await,
        Some(AuthJwt::new("jwt-1", Some("refresh-1".to_string())))
    );
}

/// **VALUE**: A second refresh supersedes the first silently.
///
/// **WHY THIS MATTERS**: A 401 can trigger a refresh while the host asks for
/// one too; the abandoned request must not overwrite the newer JWT.
///
/// **BUG THIS CATCHES**: Would catch the superseded refresh being reported as
/// a RefreshAuthTokenFailure, or its late answer replacing the second one.
#[tokio::test(start_paused = true)]
async fn given_in_flight_refresh_when_refreshing_again_then_only_second_result_lands() {
    // GIVEN: An authenticated handler with a slow refresh in flight
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(100)));
    f.handler.authenticate(grant("code-1"));
    settle(150).await;
    drain(&mut f.events);
    f.handler.refresh_token().await;
    settle(10).await;

    // WHEN: A second refresh supersedes it
    f.handler.refresh_token().await;
    settle(200).await;

    // THEN: Only the second refreshed JWT, no error events
    let expected = AuthJwt::new("refreshed-jwt-2", Some("refresh-1".to_string()));
    assert_eq!(drain(&mut f.events), vec![Event::Authenticated(expected.clone())]);
    assert_eq!(f.handler.auth_jwt().await, Some(expected));
    assert_eq!(f.api.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn given_api_reports_cancellation_when_refreshing_then_no_event() {
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(10)));
    f.handler.authenticate(grant("code-1"));
    settle(20).await;
    drain(&mut f.events);
    *f.api.failure.lock().unwrap() = Some(AuthError::cancelled());

    f.handler.refresh_token().await;
    settle(20).await;

    assert!(drain(&mut f.events).is_empty());
    assert_eq!(
        f.handler.auth_jwt().await,
        Some(AuthJwt::new("jwt-1", Some("refresh-1".to_string())))
    );
}

#[tokio::test(start_paused = true)]
async fn given_anonymous_when_logging_out_then_no_request() {
    let f = fixture(MockAuthApi::new(Duration::ZERO));

    f.handler.logout().await;
    settle(10).await;

    assert_eq!(f.api.logouts.load(Ordering::SeqCst), 0);
}

/// **VALUE**: Logout only revokes server-side; local cleanup waits for the
/// server's logout event.
#[tokio::test(start_paused = true)]
async fn given_authenticated_when_logging_out_then_request_sent_and_token_kept() {
    // GIVEN: An authenticated handler
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(10)));
    f.handler.authenticate(grant("code-1"));
    settle(20).await;
    drain(&mut f.events);

    // WHEN: Logging out
    f.handler.logout().await;
    settle(20).await;

    // THEN: One revoke call, token still held, no events
    assert_eq!(f.api.logouts.load(Ordering::SeqCst), 1);
    assert!(f.handler.auth_jwt().await.is_some());
    assert!(drain(&mut f.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn given_authenticated_when_cleared_then_token_and_flag_removed() {
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(10)));
    f.handler.authenticate(grant("code-1"));
    settle(20).await;

    f.handler.clear().await;

    assert_eq!(f.handler.auth_jwt().await, None);
    assert!(!f.handler.was_authenticated());
}

/// **VALUE**: Clearing while an exchange is in flight discards its result.
///
/// **BUG THIS CATCHES**: Would catch a logout racing a sign-in and leaving
/// the user signed in.
#[tokio::test(start_paused = true)]
async fn given_in_flight_exchange_when_cleared_then_result_discarded() {
    // GIVEN: An exchange in flight
    let mut f = fixture(MockAuthApi::new(Duration::from_millis(100)));
    f.handler.authenticate(grant("code-1"));
    settle(10).await;

    // WHEN: Clearing before it answers
    f.handler.clear().await;
    settle(200).await;

    // THEN: Nothing held, nothing emitted
    assert_eq!(f.handler.auth_jwt().await, None);
    assert!(drain(&mut f.events).is_empty());
}
