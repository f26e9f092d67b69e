//! Authentication sub-flow: token exchange, refresh and logout.
//!
//! # Ownership
//!
//! [`AuthHandler`] is the only writer of the held [`AuthJwt`]. Every write
//! replaces the whole value under the lock, so readers see either the old
//! pair or the new one.
//!
//! # Cancellation
//!
//! Each network call runs in its own task with an [`AuthRequestHandle`].
//! Superseding a request fires its handle; the task then resolves to
//! [`AuthError::Cancelled`], which is logged and never surfaced.

pub mod api;
pub mod http;

pub use api::{AuthApi, AuthCodeGrant};
pub use http::HttpAuthApi;

use crate::error::AuthError;
use crate::events::{CorrectiveAction, ErrorCode, Event, EventSink};
use crate::store::{KeyValueStore, previously_authorized_key};

use common::RedactedToken;

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{RwLock, oneshot};

/// A JWT and its optional refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthJwt {
    pub jwt: RedactedToken,
    pub refresh_token: Option<RedactedToken>,
}

impl AuthJwt {
    pub fn new(jwt: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            jwt: RedactedToken::new(jwt),
            refresh_token: refresh_token.map(RedactedToken::new),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Cancel token for one in-flight auth task. Dropping it cancels too.
#[derive(Debug)]
pub struct AuthRequestHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl AuthRequestHandle {
    fn new() -> (Self, oneshot::Receiver<()>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        (
            Self {
                cancel_tx: Some(cancel_tx),
            },
            cancel_rx,
        )
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            // Receiver already gone means the task finished.
            let _ = tx.send(());
        }
    }
}

impl Drop for AuthRequestHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Race `request` against its cancel token.
async fn run_cancellable<T, F>(
    mut cancel_rx: oneshot::Receiver<()>,
    request: F,
) -> (Result<T, AuthError>, oneshot::Receiver<()>)
where
    F: Future<Output = Result<T, AuthError>>,
{
    let result = tokio::select! {
        biased;
        _ = &mut cancel_rx => Err(AuthError::cancelled()),
        result = request => result,
    };
    (result, cancel_rx)
}

/// Still live if the token was neither fired nor dropped.
fn still_current(cancel_rx: &mut oneshot::Receiver<()>) -> bool {
    matches!(
        cancel_rx.try_recv(),
        Err(oneshot::error::TryRecvError::Empty)
    )
}

pub struct AuthHandler<A: AuthApi> {
    api: Arc<A>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn EventSink>,
    previously_authorized_key: String,
    auth_jwt: Arc<RwLock<Option<AuthJwt>>>,
    authenticate_request: Option<AuthRequestHandle>,
    refresh_request: Option<AuthRequestHandle>,
}

impl<A: AuthApi> AuthHandler<A> {
    pub fn new(
        api: Arc<A>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn EventSink>,
        deployment_id: &str,
    ) -> Self {
        Self {
            api,
            store,
            sink,
            previously_authorized_key: previously_authorized_key(deployment_id),
            auth_jwt: Arc::new(RwLock::new(None)),
            authenticate_request: None,
            refresh_request: None,
        }
    }

    /// Shared read handle on the held token.
    pub fn shared_auth_jwt(&self) -> Arc<RwLock<Option<AuthJwt>>> {
        Arc::clone(&self.auth_jwt)
    }

    pub async fn auth_jwt(&self) -> Option<AuthJwt> {
        self.auth_jwt.read().await.clone()
    }

    /// Whether this deployment completed a token exchange before.
    pub fn was_authenticated(&self) -> bool {
        self.store
            .get_bool(&self.previously_authorized_key)
            .unwrap_or_else(|e| {
                warn!("Could not read previously-authorized flag: {e}");
                false
            })
    }

    /// Start a token exchange. Cancels in-flight exchange and refresh requests.
    pub fn authenticate(&mut self, grant: AuthCodeGrant) {
        self.cancel_all();

        let (handle, cancel_rx) = AuthRequestHandle::new();
        self.authenticate_request = Some(handle);

        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);
        let auth_jwt = Arc::clone(&self.auth_jwt);
        let flag_key = self.previously_authorized_key.clone();

        debug!("Submitting token exchange");
        tokio::spawn(async move {
            let (result, mut cancel_rx) =
                run_cancellable(cancel_rx, api.fetch_auth_jwt(grant)).await;

            match result {
                Ok(jwt) => {
                    let mut guard = auth_jwt.write().await;
                    if !still_current(&mut cancel_rx) {
                        info!("Token exchange completed after being superseded, discarding");
                        return;
                    }
                    *guard = Some(jwt.clone());
                    drop(guard);

                    if let Err(e) = store.set_bool(&flag_key, true) {
                        error!("Failed to persist previously-authorized flag: {e}");
                    }
                    info!("Authenticated");
                    sink.emit(Event::Authenticated(jwt));
                }
                Err(e) => report_failure(&*sink, ErrorCode::AuthFailed, e),
            }
        });
    }

    /// Revoke the held token server-side. Local state is left alone; the
    /// server's `LogoutEvent` drives the local cleanup.
    pub async fn logout(&self) {
        let Some(current) = self.auth_jwt().await else {
            warn!("Logout requested without an authenticated session, ignoring");
            return;
        };

        let api = Arc::clone(&self.api);
        debug!("Submitting logout");
        tokio::spawn(async move {
            match api.logout(current.jwt).await {
                Ok(()) => info!("Logout request accepted"),
                Err(e) => warn!(
                    "Logout request failed ({}): {e}",
                    e.error_category()
                ),
            }
        });
    }

    /// Refresh the JWT. Without a refresh token this is a logged no-op.
    pub async fn refresh_token(&mut self) {
        let Some(refresh_token) = self
            .auth_jwt()
            .await
            .and_then(|current| current.refresh_token)
        else {
            warn!("Token refresh requested without a refresh token, ignoring");
            return;
        };

        if let Some(mut previous) = self.refresh_request.take() {
            previous.cancel();
        }
        let (handle, cancel_rx) = AuthRequestHandle::new();
        self.refresh_request = Some(handle);

        let api = Arc::clone(&self.api);
        let sink = Arc::clone(&self.sink);
        let auth_jwt = Arc::clone(&self.auth_jwt);

        debug!("Submitting token refresh");
        tokio::spawn(async move {
            let (result, mut cancel_rx) =
                run_cancellable(cancel_rx, api.refresh_auth_token(refresh_token.clone())).await;

            match result {
                Ok(jwt) => {
                    let mut guard = auth_jwt.write().await;
                    if !still_current(&mut cancel_rx) {
                        info!("Token refresh completed after being superseded, discarding");
                        return;
                    }
                    let refreshed = AuthJwt {
                        jwt,
                        refresh_token: Some(refresh_token),
                    };
                    *guard = Some(refreshed.clone());
                    drop(guard);

                    info!("Token refreshed");
                    sink.emit(Event::Authenticated(refreshed));
                }
                Err(e) => report_failure(&*sink, ErrorCode::RefreshAuthTokenFailure, e),
            }
        });
    }

    /// Forget the held token and the previously-authorized flag.
    pub async fn clear(&mut self) {
        self.cancel_all();
        *self.auth_jwt.write().await = None;

        if let Err(e) = self.store.remove(&self.previously_authorized_key) {
            error!("Failed to clear previously-authorized flag: {e}");
        }
        debug!("Auth state cleared");
    }

    fn cancel_all(&mut self) {
        for mut handle in [self.authenticate_request.take(), self.refresh_request.take()]
            .into_iter()
            .flatten()
        {
            handle.cancel();
        }
    }
}

impl<A: AuthApi> Drop for AuthHandler<A> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn report_failure(sink: &dyn EventSink, code: ErrorCode, error: AuthError) {
    if error.is_cancellation() {
        info!("Auth request cancelled: {error}");
        return;
    }

    warn!("Auth request failed ({}): {error}", error.error_category());
    sink.emit(Event::error(
        code,
        error.to_string(),
        CorrectiveAction::ReAuthenticate,
    ));
}
