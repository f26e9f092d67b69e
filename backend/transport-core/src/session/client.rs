use crate::NORMAL_CLOSURE_CODE;
use crate::auth::{AuthApi, AuthCodeGrant, AuthHandler, AuthJwt};
use crate::config::MessengerConfig;
use crate::duration::{Clock, SessionDurationState, SessionDurationTracker, SystemClock};
use crate::error::SessionError;
use crate::events::EventStream;
use crate::session::actor::{ActorParts, Command, Input, SessionActor, SharedSnapshots, queue_sink};
use crate::session::state::State;
use crate::store::{KeyValueStore, previously_authorized_key};
use crate::transport::Transport;

use common::{ErrorLocation, RedactedToken};

use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::Arc;

use log::{info, warn};
use tokio::runtime::Handle;
use tokio::sync::{RwLock, mpsc, oneshot};
use uuid::Uuid;

const DEFAULT_DISCONNECT_REASON: &str = "The user has closed the connection.";

/// Cloneable handle to one messaging session.
///
/// Every command is validated by the session actor against the current
/// state. Expected wire and network conditions never come back as `Err`;
/// they arrive as [`Event::Error`](crate::events::Event::Error) on the [`EventStream`].
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use transport_core::auth::HttpAuthApi;
/// # use transport_core::config::MessengerConfig;
/// # use transport_core::session::MessagingClient;
/// # use transport_core::store::InMemoryStore;
/// # use transport_core::transport::WebSocketTransport;
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MessengerConfig::new("my-deployment", "mypurecloud.com");
/// let api = HttpAuthApi::new(config.api_base_url()?, &config.deployment_id)?;
/// let (client, mut events) = MessagingClient::new(
///     config,
///     Arc::new(WebSocketTransport::new()),
///     api,
///     Arc::new(InMemoryStore::new()),
/// )?;
///
/// client.connect().await?;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MessagingClient {
    inputs: mpsc::UnboundedSender<Input>,
    state: Arc<RwLock<State>>,
    duration: Arc<RwLock<SessionDurationState>>,
    auth_jwt: Arc<RwLock<Option<AuthJwt>>>,
    store: Arc<dyn KeyValueStore>,
    previously_authorized_key: String,
}

impl MessagingClient {
    /// Validate `config` and spawn the session actor on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoRuntime`] outside a Tokio runtime
    /// - [`SessionError::Config`] for invalid configuration
    pub fn new<A: AuthApi>(
        config: MessengerConfig,
        transport: Arc<dyn Transport>,
        api: A,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<(Self, EventStream), SessionError> {
        Self::with_clock(config, transport, api, store, Arc::new(SystemClock))
    }

    /// [`MessagingClient::new`] with an explicit wall clock for expiration notices.
    pub fn with_clock<A: AuthApi>(
        config: MessengerConfig,
        transport: Arc<dyn Transport>,
        api: A,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, EventStream), SessionError> {
        let runtime = Handle::try_current().map_err(|e| SessionError::NoRuntime {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        config.validate()?;
        let web_socket_url = config.web_socket_url()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let queue = inputs_tx.downgrade();

        let auth = AuthHandler::new(
            Arc::new(api),
            Arc::clone(&store),
            queue_sink(queue.clone()),
            &config.deployment_id,
        );
        let auth_jwt = auth.shared_auth_jwt();

        let mut duration = SessionDurationTracker::new(clock, queue_sink(queue.clone()));
        duration
            .set_session_expiration_notice_interval(config.session_expiration_notice_interval_secs);

        let snapshots = SharedSnapshots {
            state: Arc::new(RwLock::new(State::Idle)),
            duration: Arc::new(RwLock::new(duration.snapshot())),
        };

        let session_token = Uuid::new_v4().to_string();
        let previously_authorized_key = previously_authorized_key(&config.deployment_id);
        info!(
            "Creating messaging session for deployment {}",
            config.deployment_id
        );

        let actor = SessionActor::new(ActorParts {
            config,
            web_socket_url,
            session_token,
            transport,
            auth,
            duration,
            events: events_tx,
            queue,
            snapshots: snapshots.clone(),
        });
        runtime.spawn(actor.run(inputs_rx));

        let client = Self {
            inputs: inputs_tx,
            state: snapshots.state,
            duration: snapshots.duration,
            auth_jwt,
            store,
            previously_authorized_key,
        };

        Ok((client, events_rx))
    }

    async fn request(&self, command: Command) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inputs
            .send(Input::Command(command, reply_tx))
            .map_err(|_| SessionError::actor_stopped())?;
        reply_rx.await.map_err(|_| SessionError::actor_stopped())?
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(Command::Connect).await
    }

    pub async fn configure_session(&self) -> Result<(), SessionError> {
        self.request(Command::ConfigureSession).await
    }

    /// Configure with the held JWT. Fails if [`authenticate`](Self::authenticate)
    /// has not succeeded.
    pub async fn configure_authenticated_session(&self) -> Result<(), SessionError> {
        self.request(Command::ConfigureAuthenticatedSession).await
    }

    pub async fn send_message(
        &self,
        text: impl Into<String>,
        custom_attributes: BTreeMap<String, String>,
    ) -> Result<(), SessionError> {
        self.request(Command::SendMessage {
            text: text.into(),
            custom_attributes,
        })
        .await
    }

    pub async fn disconnect(
        &self,
        code: u16,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.request(Command::Disconnect {
            code,
            reason: reason.into(),
        })
        .await
    }

    pub async fn disconnect_normally(&self) -> Result<(), SessionError> {
        self.disconnect(NORMAL_CLOSURE_CODE, DEFAULT_DISCONNECT_REASON)
            .await
    }

    pub async fn authenticate(
        &self,
        auth_code: impl Into<String>,
        redirect_uri: impl Into<String>,
        code_verifier: Option<String>,
    ) -> Result<(), SessionError> {
        let grant = AuthCodeGrant {
            auth_code: RedactedToken::new(auth_code),
            redirect_uri: redirect_uri.into(),
            code_verifier: code_verifier.map(RedactedToken::new),
        };
        self.request(Command::Authenticate(grant)).await
    }

    pub async fn logout(&self) -> Result<(), SessionError> {
        self.request(Command::Logout).await
    }

    pub async fn refresh_token(&self) -> Result<(), SessionError> {
        self.request(Command::RefreshToken).await
    }

    pub async fn clear_conversation(&self) -> Result<(), SessionError> {
        self.request(Command::ClearConversation).await
    }

    /// Round-trip an echo; [`Event::HealthChecked`](crate::events::Event::HealthChecked)
    /// confirms the session is alive.
    pub async fn health_check(&self) -> Result<(), SessionError> {
        self.request(Command::HealthCheck).await
    }

    pub async fn delete_attachment(
        &self,
        attachment_id: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.request(Command::DeleteAttachment(attachment_id.into()))
            .await
    }

    /// Negative values fall back to the default interval.
    pub async fn set_session_expiration_notice_interval(
        &self,
        secs: i64,
    ) -> Result<(), SessionError> {
        self.request(Command::SetSessionExpirationNoticeInterval(secs))
            .await
    }

    // ---------------------------------------------------------------
    // Snapshot reads
    // ---------------------------------------------------------------

    pub async fn state(&self) -> State {
        self.state.read().await.clone()
    }

    pub async fn session_duration(&self) -> SessionDurationState {
        *self.duration.read().await
    }

    pub async fn auth_jwt(&self) -> Option<AuthJwt> {
        self.auth_jwt.read().await.clone()
    }

    /// Whether this deployment completed a token exchange in an earlier run.
    pub fn was_authenticated(&self) -> bool {
        self.store
            .get_bool(&self.previously_authorized_key)
            .unwrap_or_else(|e| {
                warn!("Could not read previously-authorized flag: {e}");
                false
            })
    }
}
