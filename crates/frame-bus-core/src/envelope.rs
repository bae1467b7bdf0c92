//! Wire envelopes exchanged between the shell and its embedded frames.
//!
//! Field names follow the JSON wire format (`messageId`, `apiName`, ...).
//! A reply is recognized by its `success` field, a request by `apiName`
//! and a broadcast by `eventName`; the three never overlap.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Arbitrary JSON object payload carried by an envelope.
pub type Payload = serde_json::Map<String, Value>;

/// Operation name carried in a request envelope.
///
/// The built-in set is closed; `event-bus` is the reserved wildcard under
/// which dynamically registered handlers are addressed by `data.eventName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApiName {
    /// Attach handshake from a child frame.
    SystemConnect,
    /// Detach notification from a child frame.
    SystemDisconnect,
    /// Query the current user.
    UserGetInfo,
    /// Query the current session (token + user).
    UserGetSessionInfo,
    /// Wildcard for dynamically registered event handlers.
    EventBus,
    /// Operation name outside the built-in set.
    Other(String),
}

impl ApiName {
    /// Wire representation of this operation name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SystemConnect => "system.connect",
            Self::SystemDisconnect => "system.disconnect",
            Self::UserGetInfo => "user.getInfo",
            Self::UserGetSessionInfo => "user.getSessionInfo",
            Self::EventBus => "event-bus",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ApiName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ApiName {
    fn from(s: String) -> Self {
        match s.as_str() {
            "system.connect" => Self::SystemConnect,
            "system.disconnect" => Self::SystemDisconnect,
            "user.getInfo" => Self::UserGetInfo,
            "user.getSessionInfo" => Self::UserGetSessionInfo,
            "event-bus" => Self::EventBus,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ApiName {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ApiName> for String {
    fn from(name: ApiName) -> Self {
        name.as_str().to_string()
    }
}

/// Correlated request from a child frame to the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Correlation key, generated fresh per call.
    pub message_id: Uuid,
    /// Requested operation.
    pub api_name: ApiName,
    /// Identifying key of the calling sub-application.
    pub app_key: String,
    /// Location (URL) of the calling frame, informational.
    pub client_location: String,
    /// Operation arguments.
    #[serde(default)]
    pub data: Payload,
}

impl RequestEnvelope {
    /// Create a request with a fresh `messageId`.
    #[must_use]
    pub fn new(
        api_name: ApiName,
        app_key: impl Into<String>,
        client_location: impl Into<String>,
        data: Payload,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            api_name,
            app_key: app_key.into(),
            client_location: client_location.into(),
            data,
        }
    }
}

/// Correlated reply from the shell to exactly one child frame.
///
/// `message_id` must equal the request's; it is the sole correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub message_id: Uuid,
    pub app_key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

impl ReplyEnvelope {
    /// Successful reply carrying `data`.
    #[must_use]
    pub fn success(message_id: Uuid, app_key: impl Into<String>, data: Payload) -> Self {
        Self {
            message_id,
            app_key: app_key.into(),
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Successful reply with no payload (lifecycle acks).
    #[must_use]
    pub fn ack(message_id: Uuid, app_key: impl Into<String>) -> Self {
        Self {
            message_id,
            app_key: app_key.into(),
            success: true,
            message: None,
            data: None,
        }
    }

    /// Failure reply with a human-readable message.
    #[must_use]
    pub fn failure(message_id: Uuid, app_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message_id,
            app_key: app_key.into(),
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Fire-and-forget notification from the shell to all attached frames.
///
/// Carries no `messageId` and is never correlated or awaited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEnvelope {
    pub event_name: String,
    #[serde(default)]
    pub data: Payload,
}

impl BroadcastEnvelope {
    #[must_use]
    pub fn new(event_name: impl Into<String>, data: Payload) -> Self {
        Self {
            event_name: event_name.into(),
            data,
        }
    }
}

/// Any message that can travel over the frame channel.
///
/// Untagged: the variants are discriminated by their required fields
/// (`success` / `apiName` / `eventName`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Reply(ReplyEnvelope),
    Request(RequestEnvelope),
    Broadcast(BroadcastEnvelope),
}

/// Well-known event-bus event: list the shell's installed apps.
pub const EVENT_GET_APPS: &str = "get-apps";
/// Well-known event-bus event: platform-wide locale change.
pub const EVENT_CHANGE_I18N: &str = "change-i18n";

/// Key under which an event-bus request carries its event name.
pub const EVENT_NAME_KEY: &str = "eventName";
