//! The session actor.
//!
//! One task owns the [`StateMachine`], the auth handler, the duration
//! tracker and the reconnection policy. Host commands, socket callbacks,
//! auth completions and timers all arrive as [`Input`]s on a single queue and
//! are handled strictly in arrival order.
//!
//! Everything the actor hands out (socket listeners, timer actions, event
//! sinks) holds only a weak sender, so the actor stops once every
//! [`MessagingClient`](super::MessagingClient) is dropped.

use crate::NORMAL_CLOSURE_CODE;
use crate::auth::{AuthApi, AuthCodeGrant, AuthHandler};
use crate::codec::{
    self, ClearConversationRequest, ConfigureAuthenticatedSessionRequest, ConfigureSessionRequest,
    DeleteAttachmentRequest, EchoRequest, Envelope, OnMessageRequest, WireMessage, WireRequest,
};
use crate::config::MessengerConfig;
use crate::duration::{SessionDurationState, SessionDurationTracker};
use crate::error::{SessionError, TransportError};
use crate::events::{AttachmentUpdate, CorrectiveAction, ErrorCode, Event, EventSink};
use crate::reconnection::ReconnectionHandler;
use crate::session::machine::StateMachine;
use crate::session::state::{Signal, State};
use crate::transport::{SocketListener, Transport};

use common::HttpStatusCode;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::sync::{RwLock, mpsc, oneshot};
use url::Url;

pub(crate) type Reply = oneshot::Sender<Result<(), SessionError>>;

#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    ConfigureSession,
    ConfigureAuthenticatedSession,
    SendMessage {
        text: String,
        custom_attributes: BTreeMap<String, String>,
    },
    Disconnect {
        code: u16,
        reason: String,
    },
    Authenticate(AuthCodeGrant),
    Logout,
    RefreshToken,
    ClearConversation,
    HealthCheck,
    DeleteAttachment(String),
    SetSessionExpirationNoticeInterval(i64),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Connect => "connect",
            Command::ConfigureSession => "configure_session",
            Command::ConfigureAuthenticatedSession => "configure_authenticated_session",
            Command::SendMessage { .. } => "send_message",
            Command::Disconnect { .. } => "disconnect",
            Command::Authenticate(_) => "authenticate",
            Command::Logout => "logout",
            Command::RefreshToken => "refresh_token",
            Command::ClearConversation => "clear_conversation",
            Command::HealthCheck => "health_check",
            Command::DeleteAttachment(_) => "delete_attachment",
            Command::SetSessionExpirationNoticeInterval(_) => {
                "set_session_expiration_notice_interval"
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum SocketEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Failure(TransportError),
}

#[derive(Debug)]
pub(crate) enum Input {
    Command(Command, Reply),
    Socket {
        connection_id: u64,
        event: SocketEvent,
    },
    /// Completion routed back from the auth sub-flow or the duration tracker.
    Event(Event),
    ReconnectDue,
}

/// Feeds events from spawned sub-flow tasks back into the actor queue.
struct QueueSink {
    queue: mpsc::WeakUnboundedSender<Input>,
}

impl EventSink for QueueSink {
    fn emit(&self, event: Event) {
        match self.queue.upgrade() {
            Some(queue) => {
                if queue.send(Input::Event(event)).is_err() {
                    debug!("Session actor gone, dropping sub-flow event");
                }
            }
            None => debug!("Session actor gone, dropping sub-flow event"),
        }
    }
}

/// Tags callbacks with the connection they belong to.
struct ConnectionListener {
    connection_id: u64,
    queue: mpsc::WeakUnboundedSender<Input>,
}

impl ConnectionListener {
    fn push(&self, event: SocketEvent) {
        if let Some(queue) = self.queue.upgrade() {
            let _ = queue.send(Input::Socket {
                connection_id: self.connection_id,
                event,
            });
        }
    }
}

impl SocketListener for ConnectionListener {
    fn on_open(&self) {
        self.push(SocketEvent::Opened);
    }

    fn on_message(&self, text: String) {
        self.push(SocketEvent::Message(text));
    }

    fn on_closed(&self, code: u16, reason: String) {
        self.push(SocketEvent::Closed { code, reason });
    }

    fn on_failure(&self, error: TransportError) {
        self.push(SocketEvent::Failure(error));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigureMode {
    Anonymous,
    Authenticated,
}

/// Snapshots published after every input for lock-free host reads.
#[derive(Clone)]
pub(crate) struct SharedSnapshots {
    pub(crate) state: Arc<RwLock<State>>,
    pub(crate) duration: Arc<RwLock<SessionDurationState>>,
}

pub(crate) struct SessionActor<A: AuthApi> {
    config: MessengerConfig,
    web_socket_url: Url,
    session_token: String,
    transport: Arc<dyn Transport>,
    machine: StateMachine,
    auth: AuthHandler<A>,
    duration: SessionDurationTracker,
    reconnection: ReconnectionHandler,
    events: mpsc::UnboundedSender<Event>,
    queue: mpsc::WeakUnboundedSender<Input>,
    next_connection_id: u64,
    current_connection: Option<u64>,
    configure_mode: Option<ConfigureMode>,
    reconfigure_after_refresh: bool,
    snapshots: SharedSnapshots,
}

pub(crate) struct ActorParts<A: AuthApi> {
    pub(crate) config: MessengerConfig,
    pub(crate) web_socket_url: Url,
    pub(crate) session_token: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) auth: AuthHandler<A>,
    pub(crate) duration: SessionDurationTracker,
    pub(crate) events: mpsc::UnboundedSender<Event>,
    pub(crate) queue: mpsc::WeakUnboundedSender<Input>,
    pub(crate) snapshots: SharedSnapshots,
}

pub(crate) fn queue_sink(queue: mpsc::WeakUnboundedSender<Input>) -> Arc<dyn EventSink> {
    Arc::new(QueueSink { queue })
}

impl<A: AuthApi> SessionActor<A> {
    pub(crate) fn new(parts: ActorParts<A>) -> Self {
        let reconnection = ReconnectionHandler::new(parts.config.reconnection());
        let machine = StateMachine::new(Arc::new(parts.events.clone()));

        Self {
            config: parts.config,
            web_socket_url: parts.web_socket_url,
            session_token: parts.session_token,
            transport: parts.transport,
            machine,
            auth: parts.auth,
            duration: parts.duration,
            reconnection,
            events: parts.events,
            queue: parts.queue,
            next_connection_id: 0,
            current_connection: None,
            configure_mode: None,
            reconfigure_after_refresh: false,
            snapshots: parts.snapshots,
        }
    }

    pub(crate) async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        info!("Session actor started");

        while let Some(input) = inputs.recv().await {
            match input {
                Input::Command(command, reply) => {
                    let result = self.handle_command(command).await;
                    // Callers read snapshots right after the reply.
                    self.publish().await;
                    if reply.send(result).is_err() {
                        trace!("Command caller went away before the reply");
                    }
                    continue;
                }
                Input::Socket {
                    connection_id,
                    event,
                } => {
                    if self.current_connection == Some(connection_id) {
                        self.handle_socket(event).await;
                    } else {
                        trace!("Ignoring {event:?} from stale connection {connection_id}");
                    }
                }
                Input::Event(event) => self.handle_sub_flow_event(event).await,
                Input::ReconnectDue => self.handle_reconnect_due(),
            }

            self.publish().await;
        }

        self.reconnection.cancel_pending();
        self.retire_connection();
        info!("Session actor stopped");
    }

    async fn publish(&self) {
        *self.snapshots.state.write().await = self.machine.state().clone();
        *self.snapshots.duration.write().await = self.duration.snapshot();
    }

    fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    fn emit_error(&self, code: ErrorCode, message: impl Into<String>, action: CorrectiveAction) {
        self.emit(Event::error(code, message, action));
    }

    // ---------------------------------------------------------------
    // Host commands
    // ---------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) -> Result<(), SessionError> {
        trace!("Handling command {}", command.name());
        let name = command.name();

        match command {
            Command::Connect => {
                self.machine.apply(Signal::Connect)?;
                self.reconnection = ReconnectionHandler::new(self.config.reconnection());
                self.open_connection();
                Ok(())
            }
            Command::ConfigureSession => {
                self.require_state(name, |state| matches!(state, State::Connected))?;
                self.send_request(&ConfigureSessionRequest::new(
                    self.session_token.clone(),
                    self.config.deployment_id.clone(),
                ))?;
                self.configure_mode = Some(ConfigureMode::Anonymous);
                Ok(())
            }
            Command::ConfigureAuthenticatedSession => {
                self.require_state(name, |state| matches!(state, State::Connected))?;
                let Some(auth_jwt) = self.auth.auth_jwt().await else {
                    return Err(SessionError::invalid_command(
                        name,
                        self.machine.state().clone(),
                        "no auth token held, authenticate first",
                    ));
                };
                self.send_request(&ConfigureAuthenticatedSessionRequest::new(
                    self.session_token.clone(),
                    self.config.deployment_id.clone(),
                    auth_jwt.jwt.expose(),
                ))?;
                self.configure_mode = Some(ConfigureMode::Authenticated);
                Ok(())
            }
            Command::SendMessage {
                text,
                custom_attributes,
            } => {
                self.require_configured(name)?;
                self.send_request(&OnMessageRequest::new(
                    self.session_token.clone(),
                    text,
                    custom_attributes,
                ))
            }
            Command::ClearConversation => {
                self.require_configured(name)?;
                self.send_request(&ClearConversationRequest::new(self.session_token.clone()))
            }
            Command::HealthCheck => {
                self.require_configured(name)?;
                self.send_request(&EchoRequest::health_check(self.session_token.clone()))
            }
            Command::DeleteAttachment(attachment_id) => {
                self.require_configured(name)?;
                self.send_request(&DeleteAttachmentRequest::new(
                    self.session_token.clone(),
                    attachment_id,
                ))
            }
            Command::Disconnect { code, reason } => {
                self.machine.apply(Signal::Disconnect {
                    code,
                    reason: reason.clone(),
                })?;
                self.reconnection.cancel_pending();
                self.close_or_finish(code, &reason);
                Ok(())
            }
            Command::Authenticate(grant) => {
                self.auth.authenticate(grant);
                Ok(())
            }
            Command::Logout => {
                self.auth.logout().await;
                Ok(())
            }
            Command::RefreshToken => {
                self.auth.refresh_token().await;
                Ok(())
            }
            Command::SetSessionExpirationNoticeInterval(secs) => {
                self.duration.set_session_expiration_notice_interval(secs);
                Ok(())
            }
        }
    }

    #[track_caller]
    fn require_state(
        &self,
        command: &'static str,
        allowed: impl Fn(&State) -> bool,
    ) -> Result<(), SessionError> {
        let state = self.machine.state();
        if allowed(state) {
            return Ok(());
        }
        Err(SessionError::invalid_command(
            command,
            state.clone(),
            "not valid in the current state",
        ))
    }

    #[track_caller]
    fn require_configured(&self, command: &'static str) -> Result<(), SessionError> {
        self.require_state(command, |state| matches!(state, State::Configured { .. }))
    }

    fn send_request<R: WireRequest>(&self, request: &R) -> Result<(), SessionError> {
        let frame = codec::encode_request(request)?;
        debug!("Sending {:?} request", request.action());
        self.transport.send(frame)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Connection management
    // ---------------------------------------------------------------

    fn open_connection(&mut self) {
        self.next_connection_id += 1;
        let connection_id = self.next_connection_id;
        self.current_connection = Some(connection_id);

        let listener = Arc::new(ConnectionListener {
            connection_id,
            queue: self.queue.clone(),
        });

        debug!("Opening connection {connection_id}");
        if let Err(e) = self.transport.open(&self.web_socket_url, listener) {
            warn!("Transport refused to open: {e}");
            // Route through the queue like any other failure.
            if let Some(queue) = self.queue.upgrade() {
                let _ = queue.send(Input::Socket {
                    connection_id,
                    event: SocketEvent::Failure(e),
                });
            }
        }
    }

    /// Stop listening to the current connection.
    fn retire_connection(&mut self) {
        self.current_connection = None;
    }

    /// Close the socket, or finish the close right away when there is none.
    fn close_or_finish(&mut self, code: u16, reason: &str) {
        if self.current_connection.is_some() {
            match self.transport.close(code, reason) {
                Ok(()) => return,
                Err(e) => debug!("Close handshake unavailable ({e}), closing locally"),
            }
        }

        self.retire_connection();
        self.apply_inbound(Signal::SocketClosed {
            code,
            reason: reason.to_string(),
            reconnect: false,
        });
        self.on_session_ended();
    }

    /// Close the socket from our side after the state already moved on.
    fn close_and_retire(&mut self, code: u16, reason: &str) {
        if let Err(e) = self.transport.close(code, reason) {
            debug!("Socket close failed: {e}");
        }
        self.retire_connection();
    }

    fn on_session_ended(&mut self) {
        self.reconnection.cancel_pending();
        self.duration.clear();
    }

    fn handle_reconnect_due(&mut self) {
        if matches!(self.machine.state(), State::Reconnecting) {
            info!(
                "Reconnecting ({} attempts left)",
                self.reconnection.attempts_left()
            );
            self.open_connection();
        } else {
            debug!("Reconnect timer fired outside Reconnecting, ignoring");
        }
    }

    fn schedule_reconnect(&mut self) {
        let queue = self.queue.clone();
        let scheduled = self.reconnection.reconnect(move || {
            if let Some(queue) = queue.upgrade() {
                let _ = queue.send(Input::ReconnectDue);
            }
        });

        if !scheduled {
            self.apply_inbound(Signal::ReconnectExhausted);
            self.on_session_ended();
        }
    }

    // ---------------------------------------------------------------
    // Socket callbacks
    // ---------------------------------------------------------------

    async fn handle_socket(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => self.handle_opened().await,
            SocketEvent::Message(text) => self.handle_frame(&text).await,
            SocketEvent::Closed { code, reason } => self.handle_closed(code, reason),
            SocketEvent::Failure(error) => self.handle_failure(error),
        }
    }

    async fn handle_opened(&mut self) {
        if let State::Closing { code, .. } = self.machine.state() {
            // Disconnected mid-handshake; the queued close frame finishes it.
            debug!("Socket opened while closing ({code}), waiting for the close");
            return;
        }

        let resumed = matches!(self.machine.state(), State::Reconnecting);
        if !self.apply_inbound(Signal::SocketOpened) {
            return;
        }

        self.reconnection = ReconnectionHandler::new(self.config.reconnection());

        if resumed && let Some(mode) = self.configure_mode {
            info!("Connection restored, re-sending {mode:?} configure");
            self.resend_configure(mode).await;
        }
    }

    async fn resend_configure(&mut self, mode: ConfigureMode) {
        let result = match mode {
            ConfigureMode::Anonymous => self.send_request(&ConfigureSessionRequest::new(
                self.session_token.clone(),
                self.config.deployment_id.clone(),
            )),
            ConfigureMode::Authenticated => {
                match self.auth.auth_jwt().await {
                    Some(held) => self.send_request(&ConfigureAuthenticatedSessionRequest::new(
                        self.session_token.clone(),
                        self.config.deployment_id.clone(),
                        held.jwt.expose(),
                    )),
                    None => {
                        warn!("No auth token held for authenticated re-configure");
                        self.emit_error(
                            ErrorCode::AuthFailed,
                            "No auth token held to re-configure the session",
                            CorrectiveAction::ReAuthenticate,
                        );
                        return;
                    }
                }
            }
        };

        if let Err(e) = result {
            error!("Re-configure failed: {e}");
            self.emit_error(ErrorCode::WebsocketError, e.to_string(), CorrectiveAction::Unknown);
        }
    }

    fn handle_closed(&mut self, code: u16, reason: String) {
        self.retire_connection();
        let state = self.machine.state().clone();

        if matches!(state, State::Reconnecting) && !self.reconnection.should_reconnect() {
            self.apply_inbound(Signal::ReconnectExhausted);
            self.on_session_ended();
            return;
        }

        let reconnect = !matches!(state, State::Closing { .. })
            && code != NORMAL_CLOSURE_CODE
            && self.reconnection.should_reconnect();

        if !self.apply_inbound(Signal::SocketClosed {
            code,
            reason,
            reconnect,
        }) {
            return;
        }

        match self.machine.state() {
            State::Reconnecting => self.schedule_reconnect(),
            State::Closed { .. } => self.on_session_ended(),
            _ => {}
        }
    }

    fn handle_failure(&mut self, error: TransportError) {
        self.retire_connection();
        let state = self.machine.state().clone();

        if matches!(state, State::Reconnecting) && !self.reconnection.should_reconnect() {
            warn!("Reconnect attempt failed with no attempts left: {error}");
            self.apply_inbound(Signal::ReconnectExhausted);
            self.on_session_ended();
            return;
        }

        let code = error.error_code();
        let reconnect = !matches!(state, State::Closing { .. })
            && code.is_recoverable()
            && self.reconnection.should_reconnect();

        if !self.apply_inbound(Signal::SocketFailure {
            code,
            message: error.to_string(),
            reconnect,
        }) {
            return;
        }

        match self.machine.state() {
            State::Reconnecting => self.schedule_reconnect(),
            State::Error { code, message } => {
                let action = match code {
                    ErrorCode::WebsocketAccessDenied => CorrectiveAction::Forbidden,
                    _ => CorrectiveAction::Unknown,
                };
                self.emit_error(*code, message.clone(), action);
                self.on_session_ended();
            }
            State::Closed { .. } => self.on_session_ended(),
            _ => {}
        }
    }

    /// Apply a signal caused by inbound traffic. Rejections are surfaced as
    /// error events rather than returned.
    fn apply_inbound(&mut self, signal: Signal) -> bool {
        match self.machine.apply(signal) {
            Ok(_) => true,
            Err(e) => {
                warn!("Inbound signal rejected: {e}");
                self.emit_error(
                    ErrorCode::UnexpectedError,
                    e.to_string(),
                    CorrectiveAction::Unknown,
                );
                false
            }
        }
    }

    // ---------------------------------------------------------------
    // Inbound frames
    // ---------------------------------------------------------------

    async fn handle_frame(&mut self, text: &str) {
        let envelope = match codec::decode_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable frame: {e}");
                self.emit_error(
                    ErrorCode::UnexpectedError,
                    e.to_string(),
                    CorrectiveAction::Unknown,
                );
                return;
            }
        };

        trace!(
            "Received {} (code {})",
            envelope.message.class().as_str(),
            envelope.code
        );
        self.dispatch(envelope).await;
    }

    async fn dispatch(&mut self, envelope: Envelope) {
        let Envelope { code, message, .. } = envelope;

        match message {
            WireMessage::SessionResponse(response) => {
                self.duration
                    .update_session_duration(response.duration_seconds, response.expiration_date);
                self.apply_inbound(Signal::SessionConfigured {
                    connected: response.connected,
                    new_session: response.new_session,
                    read_only: response.read_only,
                });
            }
            WireMessage::StringMessage(body) => self.handle_string_message(code, body).await,
            WireMessage::StructuredMessage(message) => {
                if message.is_health_check_echo() {
                    self.emit(Event::HealthChecked);
                } else {
                    self.emit(Event::MessageReceived(message));
                }
            }
            WireMessage::PresignedUrlResponse(response) => {
                self.emit(Event::Attachment(AttachmentUpdate::Presigned(response)));
            }
            WireMessage::AttachmentDeletedResponse(response) => {
                self.emit(Event::Attachment(AttachmentUpdate::Deleted(response)));
            }
            WireMessage::UploadSuccessEvent(event) => {
                self.emit(Event::Attachment(AttachmentUpdate::Uploaded(event)));
            }
            WireMessage::UploadFailureEvent(event) => {
                self.emit(Event::Attachment(AttachmentUpdate::UploadFailed(event)));
            }
            WireMessage::GenerateUrlError(error) => {
                self.emit(Event::Attachment(AttachmentUpdate::UrlGenerationFailed(error)));
            }
            WireMessage::JwtResponse(response) => {
                self.emit(Event::JwtReceived {
                    jwt: response.jwt,
                    exp: response.exp,
                });
            }
            WireMessage::TooManyRequestsErrorMessage(message) => {
                warn!(
                    "Rate limited by server, retry after {}s",
                    message.retry_after
                );
                self.emit_error(
                    ErrorCode::RequestRateTooHigh,
                    message.error_message,
                    CorrectiveAction::TooManyRequests,
                );
            }
            WireMessage::SessionExpiredEvent(_) => {
                if self.apply_inbound(Signal::SessionExpired) {
                    self.duration.clear();
                }
            }
            WireMessage::LogoutEvent(_) => {
                if !self.apply_inbound(Signal::Logout) {
                    return;
                }
                self.auth.clear().await;
                self.configure_mode = None;
                self.on_session_ended();
                let reason = closed_reason(self.machine.state());
                self.close_and_retire(NORMAL_CLOSURE_CODE, &reason);
                self.emit(Event::Logout);
            }
            WireMessage::SessionClearedEvent(_) => {
                self.emit(Event::ConversationCleared);
                if self.apply_inbound(Signal::SessionCleared) {
                    let reason = closed_reason(self.machine.state());
                    self.close_or_finish(NORMAL_CLOSURE_CODE, &reason);
                }
            }
            WireMessage::ConnectionClosedEvent(_) => {
                self.emit(Event::ConnectionClosed);
                if self.apply_inbound(Signal::RemoteClosed) {
                    let reason = closed_reason(self.machine.state());
                    self.close_or_finish(NORMAL_CLOSURE_CODE, &reason);
                }
            }
        }
    }

    async fn handle_string_message(&mut self, code: u16, body: String) {
        let status = HttpStatusCode(code);
        if !status.is_error() {
            debug!("Server message (code {code}): {body}");
            return;
        }

        if status.is_unauthorized() && self.try_refresh_for_unauthorized().await {
            return;
        }

        let numeric = i32::from(code);
        self.emit_error(
            ErrorCode::from_code(numeric),
            body,
            CorrectiveAction::from_code(numeric),
        );
    }

    /// Refresh the token on a 401 for an authenticated session if allowed.
    async fn try_refresh_for_unauthorized(&mut self) -> bool {
        if !self.config.auto_refresh_token_when_expired
            || self.configure_mode != Some(ConfigureMode::Authenticated)
        {
            return false;
        }

        let can_refresh = self
            .auth
            .auth_jwt()
            .await
            .is_some_and(|held| held.can_refresh());
        if !can_refresh {
            return false;
        }

        info!("Session token rejected, refreshing before re-configuring");
        self.reconfigure_after_refresh = true;
        self.auth.refresh_token().await;
        true
    }

    // ---------------------------------------------------------------
    // Sub-flow completions
    // ---------------------------------------------------------------

    async fn handle_sub_flow_event(&mut self, event: Event) {
        match &event {
            Event::Authenticated(_) if self.reconfigure_after_refresh => {
                self.reconfigure_after_refresh = false;
                if matches!(
                    self.machine.state(),
                    State::Connected | State::Configured { .. }
                ) {
                    self.resend_configure(ConfigureMode::Authenticated).await;
                }
            }
            Event::Error {
                code: ErrorCode::RefreshAuthTokenFailure,
                ..
            } => self.reconfigure_after_refresh = false,
            _ => {}
        }

        self.emit(event);
    }
}

fn closed_reason(state: &State) -> String {
    match state {
        State::Closing { reason, .. } | State::Closed { reason, .. } => reason.clone(),
        _ => String::new(),
    }
}
