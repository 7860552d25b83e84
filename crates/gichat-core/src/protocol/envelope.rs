//! Wire envelope types
//!
//! Every frame after the identity frame is a UTF-8 JSON object with this
//! shape. Field names are the ones the chat server expects.

use core::fmt;

use serde::{Deserialize, Serialize};

/// `type` field of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Msg,
    File,
    Request,
}

/// `event` field of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireEvent {
    SendMessage,
    Request,
    SrvMessage,
    SrvCommand,
    /// Any event name this client does not know; routed by `type` alone
    #[serde(other)]
    Other,
}

/// One protocol message exchanged over the connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub event: WireEvent,
    #[serde(default)]
    pub username: String,
    /// Text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Base64 binary payload, only on `file` envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Only on outgoing `msg`/`send_message`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,
}

impl Envelope {
    /// Bare envelope with no payload fields set
    pub fn new(kind: EnvelopeKind, event: WireEvent, username: impl Into<String>) -> Self {
        Self {
            kind,
            event,
            username: username.into(),
            message: None,
            data: None,
            filename: None,
            admin_key: None,
        }
    }

    /// Text payload, or empty when absent
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// The two in-band request/response exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    History,
    UserList,
}

impl RequestKind {
    /// Payload placed in the request envelope's `message` field
    pub fn wire_payload(&self) -> &'static str {
        match self {
            RequestKind::History => "RAW:MSGDB",
            RequestKind::UserList => "RAW:USERLIST",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::History => "history",
            RequestKind::UserList => "user list",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Server-info object sent in reply to the identity frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
}
