//! Wire codec for the messaging socket.
//!
//! Every inbound frame is an envelope:
//!
//! ```json
//! {"type":"response","messageClass":"SessionResponse","code":200,"body":{...}}
//! ```
//!
//! Decoding is two-phase. The first pass reads only `type`, `messageClass`
//! and `code`; the second pass decodes `body` against the one payload shape
//! the class names. Unknown keys are ignored at every level.

pub mod message;
pub mod request;

pub use message::*;
pub use request::*;

use crate::error::{DecodeError, EncodeError};

use log::trace;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_ENVELOPE_CODE: u16 = 200;

/// The `messageClass` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    StringMessage,
    SessionResponse,
    StructuredMessage,
    PresignedUrlResponse,
    AttachmentDeletedResponse,
    UploadFailureEvent,
    UploadSuccessEvent,
    JwtResponse,
    GenerateUrlError,
    SessionExpiredEvent,
    TooManyRequestsErrorMessage,
    ConnectionClosedEvent,
    LogoutEvent,
    SessionClearedEvent,
}

impl MessageClass {
    pub const ALL: [MessageClass; 14] = [
        MessageClass::StringMessage,
        MessageClass::SessionResponse,
        MessageClass::StructuredMessage,
        MessageClass::PresignedUrlResponse,
        MessageClass::AttachmentDeletedResponse,
        MessageClass::UploadFailureEvent,
        MessageClass::UploadSuccessEvent,
        MessageClass::JwtResponse,
        MessageClass::GenerateUrlError,
        MessageClass::SessionExpiredEvent,
        MessageClass::TooManyRequestsErrorMessage,
        MessageClass::ConnectionClosedEvent,
        MessageClass::LogoutEvent,
        MessageClass::SessionClearedEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageClass::StringMessage => "StringMessage",
            MessageClass::SessionResponse => "SessionResponse",
            MessageClass::StructuredMessage => "StructuredMessage",
            MessageClass::PresignedUrlResponse => "PresignedUrlResponse",
            MessageClass::AttachmentDeletedResponse => "AttachmentDeletedResponse",
            MessageClass::UploadFailureEvent => "UploadFailureEvent",
            MessageClass::UploadSuccessEvent => "UploadSuccessEvent",
            MessageClass::JwtResponse => "JwtResponse",
            MessageClass::GenerateUrlError => "GenerateUrlError",
            MessageClass::SessionExpiredEvent => "SessionExpiredEvent",
            MessageClass::TooManyRequestsErrorMessage => "TooManyRequestsErrorMessage",
            MessageClass::ConnectionClosedEvent => "ConnectionClosedEvent",
            MessageClass::LogoutEvent => "LogoutEvent",
            MessageClass::SessionClearedEvent => "SessionClearedEvent",
        }
    }

    /// Exact, case-sensitive match on the wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.as_str() == name)
    }
}

/// Envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Response,
    Message,
}

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Plain-text body; used by the backend for errors (see [`Envelope::code`]).
    StringMessage(String),
    SessionResponse(SessionResponse),
    StructuredMessage(StructuredMessage),
    PresignedUrlResponse(PresignedUrlResponse),
    AttachmentDeletedResponse(AttachmentDeletedResponse),
    UploadFailureEvent(UploadFailureEvent),
    UploadSuccessEvent(UploadSuccessEvent),
    JwtResponse(JwtResponse),
    GenerateUrlError(GenerateUrlError),
    SessionExpiredEvent(SessionExpiredEvent),
    TooManyRequestsErrorMessage(TooManyRequestsErrorMessage),
    ConnectionClosedEvent(ConnectionClosedEvent),
    LogoutEvent(LogoutEvent),
    SessionClearedEvent(SessionClearedEvent),
}

impl WireMessage {
    pub fn class(&self) -> MessageClass {
        match self {
            WireMessage::StringMessage(_) => MessageClass::StringMessage,
            WireMessage::SessionResponse(_) => MessageClass::SessionResponse,
            WireMessage::StructuredMessage(_) => MessageClass::StructuredMessage,
            WireMessage::PresignedUrlResponse(_) => MessageClass::PresignedUrlResponse,
            WireMessage::AttachmentDeletedResponse(_) => MessageClass::AttachmentDeletedResponse,
            WireMessage::UploadFailureEvent(_) => MessageClass::UploadFailureEvent,
            WireMessage::UploadSuccessEvent(_) => MessageClass::UploadSuccessEvent,
            WireMessage::JwtResponse(_) => MessageClass::JwtResponse,
            WireMessage::GenerateUrlError(_) => MessageClass::GenerateUrlError,
            WireMessage::SessionExpiredEvent(_) => MessageClass::SessionExpiredEvent,
            WireMessage::TooManyRequestsErrorMessage(_) => {
                MessageClass::TooManyRequestsErrorMessage
            }
            WireMessage::ConnectionClosedEvent(_) => MessageClass::ConnectionClosedEvent,
            WireMessage::LogoutEvent(_) => MessageClass::LogoutEvent,
            WireMessage::SessionClearedEvent(_) => MessageClass::SessionClearedEvent,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message_type: MessageType,
    pub code: u16,
    pub message: WireMessage,
}

impl Envelope {
    /// A `response` envelope with code 200.
    pub fn new(message: WireMessage) -> Self {
        Self {
            message_type: MessageType::Response,
            code: DEFAULT_ENVELOPE_CODE,
            message,
        }
    }
}

/// First decoding pass: the envelope header only.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Discriminator {
    #[serde(rename = "type", default)]
    message_type: Option<Value>,
    #[serde(default)]
    message_class: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

#[derive(Deserialize)]
struct Body<T> {
    body: T,
}

#[derive(Deserialize)]
struct OptionalBody<T> {
    #[serde(default = "Option::default")]
    body: Option<T>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeOut<'a, T: Serialize> {
    #[serde(rename = "type")]
    message_type: MessageType,
    message_class: &'static str,
    code: u16,
    body: &'a T,
}

pub fn decode(raw: &str) -> Result<WireMessage, DecodeError> {
    decode_envelope(raw).map(|envelope| envelope.message)
}

pub fn decode_envelope(raw: &str) -> Result<Envelope, DecodeError> {
    let header: Discriminator =
        serde_json::from_str(raw).map_err(|e| DecodeError::invalid_json(e.to_string()))?;

    let class_name = header
        .message_class
        .ok_or_else(DecodeError::missing_discriminator)?;
    let class =
        MessageClass::parse(&class_name).ok_or_else(|| DecodeError::unknown_class(&class_name))?;

    let message_type = match header.message_type.as_ref().and_then(Value::as_str) {
        Some("message") => MessageType::Message,
        _ => MessageType::Response,
    };
    let code = envelope_code(header.code.as_ref(), class)?;

    trace!("Decoding {} envelope", class.as_str());

    let message = match class {
        MessageClass::StringMessage => WireMessage::StringMessage(body(raw, class)?),
        MessageClass::SessionResponse => WireMessage::SessionResponse(body(raw, class)?),
        MessageClass::StructuredMessage => WireMessage::StructuredMessage(body(raw, class)?),
        MessageClass::PresignedUrlResponse => {
            WireMessage::PresignedUrlResponse(body(raw, class)?)
        }
        MessageClass::AttachmentDeletedResponse => {
            WireMessage::AttachmentDeletedResponse(body(raw, class)?)
        }
        MessageClass::UploadFailureEvent => WireMessage::UploadFailureEvent(body(raw, class)?),
        MessageClass::UploadSuccessEvent => WireMessage::UploadSuccessEvent(body(raw, class)?),
        MessageClass::JwtResponse => WireMessage::JwtResponse(body(raw, class)?),
        MessageClass::GenerateUrlError => WireMessage::GenerateUrlError(body(raw, class)?),
        MessageClass::SessionExpiredEvent => {
            WireMessage::SessionExpiredEvent(optional_body(raw, class)?)
        }
        MessageClass::TooManyRequestsErrorMessage => {
            WireMessage::TooManyRequestsErrorMessage(body(raw, class)?)
        }
        MessageClass::ConnectionClosedEvent => {
            WireMessage::ConnectionClosedEvent(optional_body(raw, class)?)
        }
        MessageClass::LogoutEvent => WireMessage::LogoutEvent(optional_body(raw, class)?),
        MessageClass::SessionClearedEvent => {
            WireMessage::SessionClearedEvent(optional_body(raw, class)?)
        }
    };

    Ok(Envelope {
        message_type,
        code,
        message,
    })
}

/// Absent or `null` means 200; anything else must be an integer in `u16`.
fn envelope_code(code: Option<&Value>, class: MessageClass) -> Result<u16, DecodeError> {
    match code {
        None | Some(Value::Null) => Ok(DEFAULT_ENVELOPE_CODE),
        Some(value) => value
            .as_u64()
            .and_then(|code| u16::try_from(code).ok())
            .ok_or_else(|| {
                DecodeError::invalid_payload(class.as_str(), format!("invalid code {value}"))
            }),
    }
}

fn body<T: DeserializeOwned>(raw: &str, class: MessageClass) -> Result<T, DecodeError> {
    serde_json::from_str::<Body<T>>(raw)
        .map(|wrapper| wrapper.body)
        .map_err(|e| DecodeError::invalid_payload(class.as_str(), e.to_string()))
}

/// Signal payloads: an absent or `null` body decodes to the empty value.
fn optional_body<T: DeserializeOwned + Default>(
    raw: &str,
    class: MessageClass,
) -> Result<T, DecodeError> {
    serde_json::from_str::<OptionalBody<T>>(raw)
        .map(|wrapper| wrapper.body.unwrap_or_default())
        .map_err(|e| DecodeError::invalid_payload(class.as_str(), e.to_string()))
}

/// Encode as a `response` envelope with code 200.
pub fn encode(message: &WireMessage) -> Result<String, EncodeError> {
    encode_envelope(&Envelope::new(message.clone()))
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String, EncodeError> {
    let message_type = envelope.message_type;
    let code = envelope.code;

    match &envelope.message {
        WireMessage::StringMessage(body) => {
            write(message_type, MessageClass::StringMessage, code, body)
        }
        WireMessage::SessionResponse(body) => {
            write(message_type, MessageClass::SessionResponse, code, body)
        }
        WireMessage::StructuredMessage(body) => {
            write(message_type, MessageClass::StructuredMessage, code, body)
        }
        WireMessage::PresignedUrlResponse(body) => {
            write(message_type, MessageClass::PresignedUrlResponse, code, body)
        }
        WireMessage::AttachmentDeletedResponse(body) => {
            write(message_type, MessageClass::AttachmentDeletedResponse, code, body)
        }
        WireMessage::UploadFailureEvent(body) => {
            write(message_type, MessageClass::UploadFailureEvent, code, body)
        }
        WireMessage::UploadSuccessEvent(body) => {
            write(message_type, MessageClass::UploadSuccessEvent, code, body)
        }
        WireMessage::JwtResponse(body) => {
            write(message_type, MessageClass::JwtResponse, code, body)
        }
        WireMessage::GenerateUrlError(body) => {
            write(message_type, MessageClass::GenerateUrlError, code, body)
        }
        WireMessage::SessionExpiredEvent(body) => {
            write(message_type, MessageClass::SessionExpiredEvent, code, body)
        }
        WireMessage::TooManyRequestsErrorMessage(body) => write(
            message_type,
            MessageClass::TooManyRequestsErrorMessage,
            code,
            body,
        ),
        WireMessage::ConnectionClosedEvent(body) => {
            write(message_type, MessageClass::ConnectionClosedEvent, code, body)
        }
        WireMessage::LogoutEvent(body) => {
            write(message_type, MessageClass::LogoutEvent, code, body)
        }
        WireMessage::SessionClearedEvent(body) => {
            write(message_type, MessageClass::SessionClearedEvent, code, body)
        }
    }
}

fn write<T: Serialize>(
    message_type: MessageType,
    class: MessageClass,
    code: u16,
    body: &T,
) -> Result<String, EncodeError> {
    let out = EnvelopeOut {
        message_type,
        message_class: class.as_str(),
        code,
        body,
    };
    Ok(serde_json::to_string(&out)?)
}

/// Serialize an outbound request frame.
pub fn encode_request<R: WireRequest>(request: &R) -> Result<String, EncodeError> {
    trace!("Encoding {:?} request", request.action());
    Ok(serde_json::to_string(request)?)
}
