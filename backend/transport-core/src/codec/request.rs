//! Outbound requests. Every request serializes with `action` as its last key.

use crate::codec::message::{CUSTOM_MESSAGE_ID_KEY, ChannelMetadata, HEALTH_CHECK_MESSAGE_ID};

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

const CUSTOMER_ID_TYPE: &str = "cookie";
const CUSTOMER_SESSION_TYPE: &str = "web";
const HEALTH_CHECK_TEXT: &str = "ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    ConfigureSession,
    ConfigureAuthenticatedSession,
    OnMessage,
    Echo,
    DeleteAttachment,
}

/// A request frame the session can put on the socket.
pub trait WireRequest: Serialize {
    fn action(&self) -> Action;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub id_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSession {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyContext {
    pub customer: Customer,
    pub customer_session: CustomerSession,
}

impl JourneyContext {
    /// Anonymous journey keyed on the session token.
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer: Customer {
                id: customer_id.into(),
                id_type: CUSTOMER_ID_TYPE,
            },
            customer_session: CustomerSession {
                id: String::new(),
                session_type: CUSTOMER_SESSION_TYPE,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureSessionRequest {
    pub token: String,
    pub deployment_id: String,
    pub journey_context: JourneyContext,
    action: Action,
}

impl ConfigureSessionRequest {
    pub fn new(token: impl Into<String>, deployment_id: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            journey_context: JourneyContext::for_customer(token.clone()),
            token,
            deployment_id: deployment_id.into(),
            action: Action::ConfigureSession,
        }
    }
}

impl WireRequest for ConfigureSessionRequest {
    fn action(&self) -> Action {
        self.action
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct AuthData {
    pub code: String,
}

#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureAuthenticatedSessionRequest {
    pub token: String,
    pub deployment_id: String,
    pub journey_context: JourneyContext,
    pub data: AuthData,
    action: Action,
}

impl ConfigureAuthenticatedSessionRequest {
    pub fn new(
        token: impl Into<String>,
        deployment_id: impl Into<String>,
        jwt: impl Into<String>,
    ) -> Self {
        let token = token.into();
        Self {
            journey_context: JourneyContext::for_customer(token.clone()),
            token,
            deployment_id: deployment_id.into(),
            data: AuthData { code: jwt.into() },
            action: Action::ConfigureAuthenticatedSession,
        }
    }
}

impl fmt::Debug for ConfigureAuthenticatedSessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigureAuthenticatedSessionRequest")
            .field("token", &self.token)
            .field("deployment_id", &self.deployment_id)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

impl WireRequest for ConfigureAuthenticatedSessionRequest {
    fn action(&self) -> Action {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundChannel {
    pub metadata: ChannelMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    pub text: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<OutboundChannel>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnMessageRequest {
    pub token: String,
    pub message: TextMessage,
    action: Action,
}

impl OnMessageRequest {
    /// Empty `custom_attributes` leaves the `channel` key out entirely.
    pub fn new(
        token: impl Into<String>,
        text: impl Into<String>,
        custom_attributes: BTreeMap<String, String>,
    ) -> Self {
        let channel = (!custom_attributes.is_empty()).then(|| OutboundChannel {
            metadata: ChannelMetadata { custom_attributes },
        });

        Self {
            token: token.into(),
            message: TextMessage {
                text: text.into(),
                message_type: "Text",
                channel,
                metadata: BTreeMap::new(),
            },
            action: Action::OnMessage,
        }
    }
}

impl WireRequest for OnMessageRequest {
    fn action(&self) -> Action {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EchoRequest {
    pub token: String,
    pub message: TextMessage,
    action: Action,
}

impl EchoRequest {
    /// Echo carrying the health-check marker the session looks for on the way back.
    pub fn health_check(token: impl Into<String>) -> Self {
        let metadata = BTreeMap::from([(
            CUSTOM_MESSAGE_ID_KEY.to_string(),
            HEALTH_CHECK_MESSAGE_ID.to_string(),
        )]);

        Self {
            token: token.into(),
            message: TextMessage {
                text: HEALTH_CHECK_TEXT.to_string(),
                message_type: "Text",
                channel: None,
                metadata,
            },
            action: Action::Echo,
        }
    }
}

impl WireRequest for EchoRequest {
    fn action(&self) -> Action {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAttachmentRequest {
    pub token: String,
    pub attachment_id: String,
    action: Action,
}

impl DeleteAttachmentRequest {
    pub fn new(token: impl Into<String>, attachment_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            attachment_id: attachment_id.into(),
            action: Action::DeleteAttachment,
        }
    }
}

impl WireRequest for DeleteAttachmentRequest {
    fn action(&self) -> Action {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presence {
    #[serde(rename = "type")]
    pub presence_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub event_type: &'static str,
    pub presence: Presence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub events: Vec<PresenceEvent>,
}

/// A `Presence/Clear` event sent through `onMessage`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearConversationRequest {
    pub token: String,
    pub message: EventMessage,
    action: Action,
}

impl ClearConversationRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            message: EventMessage {
                message_type: "Event",
                events: vec![PresenceEvent {
                    event_type: "Presence",
                    presence: Presence {
                        presence_type: "Clear",
                    },
                }],
            },
            action: Action::OnMessage,
        }
    }
}

impl WireRequest for ClearConversationRequest {
    fn action(&self) -> Action {
        self.action
    }
}
