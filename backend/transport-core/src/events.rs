//! Outbound event stream delivered to the host.
//!
//! Every observable outcome of the engine (state changes, auth results,
//! server messages, failures) is an [`Event`] on one ordered channel.

use crate::auth::AuthJwt;
use crate::codec::{
    AttachmentDeletedResponse, GenerateUrlError, PresignedUrlResponse, StructuredMessage,
    UploadFailureEvent, UploadSuccessEvent,
};
use crate::duration::SessionDurationState;
use crate::session::State;

use common::HttpStatusCode;

use log::debug;
use tokio::sync::mpsc;

/// Receiving half of the host event stream.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChanged {
        old: State,
        new: State,
    },
    Authenticated(AuthJwt),
    Error {
        code: ErrorCode,
        message: String,
        corrective_action: CorrectiveAction,
    },
    /// Raised `notice_interval_secs` before `expiration_date` (epoch seconds).
    SessionExpirationNotice {
        expiration_date: i64,
        notice_interval_secs: i64,
    },
    SessionDurationUpdated(SessionDurationState),
    MessageReceived(StructuredMessage),
    Attachment(AttachmentUpdate),
    /// The echo of a [`health_check`](crate::session::MessagingClient::health_check).
    HealthChecked,
    JwtReceived {
        jwt: String,
        exp: i64,
    },
    Logout,
    ConversationCleared,
    ConnectionClosed,
}

impl Event {
    #[track_caller]
    pub fn error(
        code: ErrorCode,
        message: impl Into<String>,
        corrective_action: CorrectiveAction,
    ) -> Self {
        Event::Error {
            code,
            message: message.into(),
            corrective_action,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentUpdate {
    Presigned(PresignedUrlResponse),
    Deleted(AttachmentDeletedResponse),
    Uploaded(UploadSuccessEvent),
    UploadFailed(UploadFailureEvent),
    UrlGenerationFailed(GenerateUrlError),
}

/// Error codes carried by [`Event::Error`] and fatal [`State::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FeatureUnavailable,
    FileTypeInvalid,
    FileSizeInvalid,
    FileAttachmentInvalid,
    SessionHasExpired,
    SessionNotFound,
    MessageTooLong,
    RequestRateTooHigh,
    UnexpectedError,
    WebsocketError,
    WebsocketAccessDenied,
    NetworkDisabled,
    CancellationError,
    AuthFailed,
    AuthLogoutFailed,
    RefreshAuthTokenFailure,
    RedirectResponseError(u16),
    ClientResponseError(u16),
    ServerResponseError(u16),
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::FeatureUnavailable => 4000,
            ErrorCode::FileTypeInvalid => 4001,
            ErrorCode::FileSizeInvalid => 4002,
            ErrorCode::FileAttachmentInvalid => 4003,
            ErrorCode::SessionHasExpired => 4006,
            ErrorCode::SessionNotFound => 4007,
            ErrorCode::MessageTooLong => 4011,
            ErrorCode::RequestRateTooHigh => 4029,
            ErrorCode::UnexpectedError => 5000,
            ErrorCode::WebsocketError => 1001,
            ErrorCode::WebsocketAccessDenied => 1002,
            ErrorCode::NetworkDisabled => -1009,
            ErrorCode::CancellationError => -999,
            ErrorCode::AuthFailed => 6000,
            ErrorCode::AuthLogoutFailed => 6001,
            ErrorCode::RefreshAuthTokenFailure => 6002,
            ErrorCode::RedirectResponseError(code)
            | ErrorCode::ClientResponseError(code)
            | ErrorCode::ServerResponseError(code) => i32::from(*code),
        }
    }

    /// Map a numeric wire code. Unknown values outside the HTTP ranges fall
    /// back to [`ErrorCode::UnexpectedError`].
    pub fn from_code(code: i32) -> Self {
        match code {
            4000 => ErrorCode::FeatureUnavailable,
            4001 => ErrorCode::FileTypeInvalid,
            4002 => ErrorCode::FileSizeInvalid,
            4003 => ErrorCode::FileAttachmentInvalid,
            4006 => ErrorCode::SessionHasExpired,
            4007 => ErrorCode::SessionNotFound,
            4011 => ErrorCode::MessageTooLong,
            4029 => ErrorCode::RequestRateTooHigh,
            5000 => ErrorCode::UnexpectedError,
            1001 => ErrorCode::WebsocketError,
            1002 => ErrorCode::WebsocketAccessDenied,
            -1009 => ErrorCode::NetworkDisabled,
            -999 => ErrorCode::CancellationError,
            6000 => ErrorCode::AuthFailed,
            6001 => ErrorCode::AuthLogoutFailed,
            6002 => ErrorCode::RefreshAuthTokenFailure,
            other => match u16::try_from(other).map(HttpStatusCode) {
                Ok(status) if status.is_redirect() => ErrorCode::RedirectResponseError(status.0),
                Ok(status) if status.is_client_error() => ErrorCode::ClientResponseError(status.0),
                Ok(status) if status.is_server_error() => ErrorCode::ServerResponseError(status.0),
                _ => ErrorCode::UnexpectedError,
            },
        }
    }

    /// Whether a session that failed with this code may be retried.
    ///
    /// An [`State::Error`] carrying a non-recoverable code is terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::WebsocketError
                | ErrorCode::NetworkDisabled
                | ErrorCode::UnexpectedError
                | ErrorCode::RequestRateTooHigh
                | ErrorCode::ServerResponseError(_)
        )
    }
}

/// Recovery hint attached to [`Event::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrectiveAction {
    BadRequest,
    Forbidden,
    NotFound,
    RequestTimeOut,
    TooManyRequests,
    ReAuthenticate,
    Unknown,
}

impl CorrectiveAction {
    pub fn from_code(code: i32) -> Self {
        match code {
            400 => CorrectiveAction::BadRequest,
            401 => CorrectiveAction::ReAuthenticate,
            403 => CorrectiveAction::Forbidden,
            404 => CorrectiveAction::NotFound,
            408 => CorrectiveAction::RequestTimeOut,
            429 | 4029 => CorrectiveAction::TooManyRequests,
            _ => CorrectiveAction::Unknown,
        }
    }
}

/// Anything that accepts engine events.
///
/// The session actor hands the auth sub-flow a sink that feeds back into its
/// own queue; hosts and tests usually pass an unbounded sender.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: Event);
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        if self.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}
