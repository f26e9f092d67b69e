//! Test helpers for session integration tests.
//!
//! - [`MockTransport`] records what the session puts on the socket and hands
//!   the current listener back so tests can play the server side
//! - [`MockAuthApi`] answers instantly with numbered tokens
//! - event helpers wait for a specific event or state on the stream

use transport_core::auth::{AuthApi, AuthCodeGrant, AuthJwt};
use transport_core::config::MessengerConfig;
use transport_core::error::{AuthError, TransportError};
use transport_core::events::{Event, EventStream};
use transport_core::session::{MessagingClient, State};
use transport_core::store::InMemoryStore;
use transport_core::transport::{SocketListener, Transport};

use common::RedactedToken;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use url::Url;

pub const DEPLOYMENT_ID: &str = "test-deployment";
pub const DOMAIN: &str = "example.test";

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct MockTransportInner {
    listener: Option<Arc<dyn SocketListener>>,
    urls: Vec<Url>,
    sent: Vec<String>,
    closes: Vec<(u16, String)>,
    queue_closes: bool,
}

/// In-memory [`Transport`]. `close` confirms immediately, like a polite peer,
/// unless built with [`MockTransport::queuing_closes`].
#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<MockTransportInner>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `close` only records the frame, like a socket still in its handshake.
    pub fn queuing_closes() -> Arc<Self> {
        let transport = Self::default();
        transport.inner.lock().unwrap().queue_closes = true;
        Arc::new(transport)
    }

    /// Listener of the most recent `open`.
    pub fn listener(&self) -> Arc<dyn SocketListener> {
        self.inner
            .lock()
            .unwrap()
            .listener
            .clone()
            .expect("transport was never opened")
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().unwrap().urls.len()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.inner.lock().unwrap().urls.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn last_sent(&self) -> Value {
        let sent = self.sent();
        let last = sent.last().expect("nothing sent");
        serde_json::from_str(last).expect("sent frame is not JSON")
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.inner.lock().unwrap().closes.clone()
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &Url, listener: Arc<dyn SocketListener>) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.urls.push(url.clone());
        inner.listener = Some(listener);
        Ok(())
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.listener.is_none() {
            return Err(TransportError::not_connected());
        }
        inner.sent.push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        let listener = {
            let mut inner = self.inner.lock().unwrap();
            inner.closes.push((code, reason.to_string()));
            if inner.queue_closes && inner.listener.is_some() {
                return Ok(());
            }
            inner.listener.clone()
        };
        match listener {
            Some(listener) => {
                listener.on_closed(code, reason.to_string());
                Ok(())
            }
            None => Err(TransportError::not_connected()),
        }
    }
}

#[derive(Default)]
pub struct AuthCounters {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub logouts: AtomicUsize,
}

/// Answers `jwt-{n}` / `refresh-{n}` and `refreshed-jwt-{n}` without delay.
#[derive(Clone, Default)]
pub struct MockAuthApi {
    pub counters: Arc<AuthCounters>,
}

impl AuthApi for MockAuthApi {
    async fn fetch_auth_jwt(&self, _grant: AuthCodeGrant) -> Result<AuthJwt, AuthError> {
        let n = self.counters.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AuthJwt::new(format!("jwt-{n}"), Some(format!("refresh-{n}"))))
    }

    async fn logout(&self, _jwt: RedactedToken) -> Result<(), AuthError> {
        self.counters.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_auth_token(
        &self,
        _refresh_token: RedactedToken,
    ) -> Result<RedactedToken, AuthError> {
        let n = self.counters.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RedactedToken::new(format!("refreshed-jwt-{n}")))
    }
}

pub struct Harness {
    pub client: MessagingClient,
    pub events: EventStream,
    pub transport: Arc<MockTransport>,
    pub auth: MockAuthApi,
}

pub fn test_config() -> MessengerConfig {
    MessengerConfig::new(DEPLOYMENT_ID, DOMAIN)
}

pub fn start(config: MessengerConfig) -> Harness {
    start_with_transport(config, MockTransport::new())
}

pub fn start_with_transport(config: MessengerConfig, transport: Arc<MockTransport>) -> Harness {
    let auth = MockAuthApi::default();
    let (client, events) = MessagingClient::new(
        config,
        transport.clone(),
        auth.clone(),
        Arc::new(InMemoryStore::new()),
    )
    .expect("Failed to create client");

    Harness {
        client,
        events,
        transport,
        auth,
    }
}

/// Wait for the first event matching `predicate`, skipping others.
pub async fn wait_for_event(
    events: &mut EventStream,
    predicate: impl Fn(&Event) -> bool,
) -> Event {
    collect_until(events, predicate).await.pop().unwrap()
}

/// Every event up to and including the first one matching `predicate`.
pub async fn collect_until(
    events: &mut EventStream,
    predicate: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for event, saw {seen:?}"))
            .expect("Event stream closed");
        let done = predicate(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub async fn wait_for_state(events: &mut EventStream, expected: State) {
    wait_for_event(
        events,
        |event| matches!(event, Event::StateChanged { new, .. } if *new == expected),
    )
    .await;
}

pub fn frame(message_type: &str, class: &str, code: u16, body: Value) -> String {
    json!({
        "type": message_type,
        "messageClass": class,
        "code": code,
        "body": body,
    })
    .to_string()
}

pub fn session_response(new_session: bool, read_only: bool) -> String {
    frame(
        "response",
        "SessionResponse",
        200,
        json!({
            "connected": true,
            "newSession": new_session,
            "readOnly": read_only,
            "durationSeconds": 259_200,
            "expirationDate": 4_102_444_800_i64,
        }),
    )
}

pub fn configured(new_session: bool, was_reconnecting: bool) -> State {
    State::Configured {
        connected: true,
        new_session,
        was_reconnecting,
    }
}

/// Connect, open the socket and configure an anonymous session.
pub async fn open_configured(harness: &mut Harness) {
    harness.client.connect().await.expect("connect");
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;

    harness
        .client
        .configure_session()
        .await
        .expect("configure_session");
    harness
        .transport
        .listener()
        .on_message(session_response(true, false));
    wait_for_state(&mut harness.events, configured(true, false)).await;
}

/// Authenticate, connect and configure an authenticated session.
pub async fn open_authenticated(harness: &mut Harness) {
    harness
        .client
        .authenticate("auth-code", "https://example.test/callback", None)
        .await
        .expect("authenticate");
    wait_for_event(&mut harness.events, |event| {
        matches!(event, Event::Authenticated(_))
    })
    .await;

    harness.client.connect().await.expect("connect");
    harness.transport.listener().on_open();
    wait_for_state(&mut harness.events, State::Connected).await;

    harness
        .client
        .configure_authenticated_session()
        .await
        .expect("configure_authenticated_session");
    harness
        .transport
        .listener()
        .on_message(session_response(false, false));
    wait_for_state(&mut harness.events, configured(false, false)).await;
}
