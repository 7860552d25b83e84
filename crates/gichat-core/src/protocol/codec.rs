//! Message protocol codec
//!
//! Pure translation between wire frames and typed values. Encoding turns
//! outgoing requests into envelopes; decoding checks an inbound frame
//! strictly and classifies it into an [`Inbound`] exactly once, so nothing
//! downstream re-parses raw text.

use serde_json::Value;

use crate::channel::communication::{Event, ImageSource, NoticeKind};
use crate::config::SessionConfig;
use crate::errors::ProtocolError;
use crate::protocol::attachment::{InlineAttachment, MediaLink};
use crate::protocol::envelope::{Envelope, EnvelopeKind, RequestKind, ServerInfo, WireEvent};
use crate::types::{HistoryEntry, Timestamp};

/// Server command asking clients to drop their message history
pub const CLEAR_MESSAGE_DB: &str = "CLEAR_MESSAGE_DB";

/// Phrase in a server notice that addresses the kicked client itself
const SELF_KICK_PHRASE: &str = "have been kicked";

// ----------------------------------------------------------------------------
// Classified Inbound Frames
// ----------------------------------------------------------------------------

/// A decoded steady-state frame, tagged by what it means to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `srv_message`; `targets_self` is set when this client was the one kicked
    Notice {
        username: String,
        text: String,
        kind: NoticeKind,
        targets_self: bool,
    },
    /// `srv_command` `CLEAR_MESSAGE_DB`
    HistoryReset,
    /// Any other `srv_command`
    ServerCommand(String),
    Text {
        username: String,
        text: String,
    },
    ImageLink {
        username: String,
        url: String,
    },
    FileLink {
        username: String,
        url: String,
    },
    InlineImage {
        username: String,
        attachment: InlineAttachment,
    },
    /// Valid envelope with nothing to surface (e.g. a request echo)
    Ignored,
}

impl Inbound {
    /// Event to emit for this frame, stamped with its arrival time
    pub fn into_event(self, received_at: Timestamp) -> Option<Event> {
        match self {
            Inbound::Notice {
                username,
                text,
                kind,
                ..
            } => Some(Event::SystemNotice {
                username,
                text,
                kind,
            }),
            Inbound::HistoryReset => Some(Event::HistoryReset),
            Inbound::ServerCommand(_) | Inbound::Ignored => None,
            Inbound::Text { username, text } => Some(Event::TextReceived {
                username,
                text,
                timestamp: received_at,
            }),
            Inbound::ImageLink { username, url } => Some(Event::ImageReceived {
                username,
                image: ImageSource::Url(url),
                timestamp: received_at,
            }),
            Inbound::FileLink { username, url } => Some(Event::FileLinkReceived {
                username,
                url,
                timestamp: received_at,
            }),
            Inbound::InlineImage {
                username,
                attachment,
            } => Some(Event::ImageReceived {
                username,
                image: ImageSource::Inline {
                    filename: attachment.filename,
                    bytes: attachment.bytes,
                },
                timestamp: received_at,
            }),
        }
    }

    /// Server notice telling this client it has been kicked
    pub fn is_self_kick(&self) -> bool {
        matches!(
            self,
            Inbound::Notice {
                kind: NoticeKind::Kick,
                targets_self: true,
                ..
            }
        )
    }
}

/// Response to an in-band request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    History(Vec<HistoryEntry>),
    UserList(Vec<String>),
}

impl Response {
    pub fn into_event(self) -> Event {
        match self {
            Response::History(entries) => Event::HistoryBatch { entries },
            Response::UserList(users) => Event::UserListUpdated { users },
        }
    }
}

/// Tag a server notice by its canonical tokens
pub fn notice_kind(text: &str) -> NoticeKind {
    let lowered = text.to_lowercase();
    if lowered.contains("kicked") {
        NoticeKind::Kick
    } else if lowered.contains("left") {
        NoticeKind::Leave
    } else if lowered.contains("join") {
        NoticeKind::Join
    } else {
        NoticeKind::General
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Encoder/decoder bound to this client's identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCodec {
    username: String,
    admin_key: Option<String>,
}

impl WireCodec {
    pub fn new(username: impl Into<String>, admin_key: Option<String>) -> Self {
        Self {
            username: username.into(),
            admin_key,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.identity.clone(), config.admin_key.clone())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// First frame of the handshake: the bare username, no envelope
    pub fn identity_frame(&self) -> String {
        self.username.clone()
    }

    // ------------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------------

    /// Chat message; carries the admin key, or an empty one
    pub fn encode_text(&self, text: &str) -> Envelope {
        let mut envelope = Envelope::new(EnvelopeKind::Msg, WireEvent::SendMessage, &self.username);
        envelope.message = Some(text.to_string());
        envelope.admin_key = Some(self.admin_key.clone().unwrap_or_default());
        envelope
    }

    pub fn encode_request(&self, request: RequestKind) -> Envelope {
        let mut envelope = Envelope::new(EnvelopeKind::Msg, WireEvent::Request, &self.username);
        envelope.message = Some(request.wire_payload().to_string());
        envelope
    }

    pub fn encode_inline_file(&self, attachment: &InlineAttachment) -> Envelope {
        let mut envelope = Envelope::new(EnvelopeKind::File, WireEvent::SendMessage, &self.username);
        envelope.data = Some(attachment.encode());
        envelope.filename = Some(attachment.filename.clone());
        envelope
    }

    /// Out-of-band attachment reference, sent as ordinary text
    pub fn encode_image_link(&self, url: &str) -> Envelope {
        self.encode_text(&MediaLink::Image(url.to_string()).to_message())
    }

    /// Serialize an envelope into a text frame
    pub fn to_frame(envelope: &Envelope) -> Result<String, ProtocolError> {
        serde_json::to_string(envelope).map_err(|e| ProtocolError::EncodeFailed {
            reason: e.to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------------

    /// Parse one inbound frame. Never panics; every failure is an
    /// `invalid frame` protocol error.
    pub fn decode_frame(&self, frame: &str) -> Result<Envelope, ProtocolError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| ProtocolError::invalid_frame(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_frame("expected a JSON object"))?;

        for field in ["type", "event"] {
            match object.get(field) {
                None | Some(Value::Null) => return Err(ProtocolError::MissingField { field }),
                Some(_) => {}
            }
        }

        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| ProtocolError::invalid_frame(e.to_string()))?;

        if envelope.message.is_some() && envelope.data.is_some() {
            return Err(ProtocolError::ConflictingPayload);
        }
        Ok(envelope)
    }

    /// Route a decoded envelope by `(kind, event)`
    pub fn classify(&self, envelope: Envelope) -> Result<Inbound, ProtocolError> {
        let Envelope {
            kind,
            event,
            username,
            message,
            data,
            filename,
            ..
        } = envelope;

        match (kind, event) {
            (_, WireEvent::SrvMessage) => {
                let text = message.unwrap_or_default();
                let kind = notice_kind(&text);
                let targets_self =
                    kind == NoticeKind::Kick && text.to_lowercase().contains(SELF_KICK_PHRASE);
                Ok(Inbound::Notice {
                    username,
                    text,
                    kind,
                    targets_self,
                })
            }

            (_, WireEvent::SrvCommand) => {
                let command = message.unwrap_or_default();
                if command.trim() == CLEAR_MESSAGE_DB {
                    Ok(Inbound::HistoryReset)
                } else {
                    Ok(Inbound::ServerCommand(command))
                }
            }

            (EnvelopeKind::Msg, event) if event != WireEvent::Request => {
                let text = message.ok_or(ProtocolError::MissingField { field: "message" })?;
                Ok(match MediaLink::parse(&text) {
                    Some(MediaLink::Image(url)) => Inbound::ImageLink { username, url },
                    Some(MediaLink::File(url)) => Inbound::FileLink { username, url },
                    None => Inbound::Text { username, text },
                })
            }

            (EnvelopeKind::File, _) => {
                let data = data.ok_or(ProtocolError::MissingField { field: "data" })?;
                let filename = filename.unwrap_or_else(|| "attachment".to_string());
                let attachment = InlineAttachment::from_base64(filename, &data)
                    .map_err(|e| ProtocolError::invalid_frame(e.to_string()))?;
                Ok(Inbound::InlineImage {
                    username,
                    attachment,
                })
            }

            _ => Ok(Inbound::Ignored),
        }
    }

    /// `decode_frame` followed by `classify`
    pub fn decode_inbound(&self, frame: &str) -> Result<Inbound, ProtocolError> {
        let envelope = self.decode_frame(frame)?;
        self.classify(envelope)
    }

    // ------------------------------------------------------------------------
    // Request/Response Frames
    // ------------------------------------------------------------------------

    /// Server-info object received right after the identity frame
    pub fn parse_server_info(frame: &str) -> Result<ServerInfo, ProtocolError> {
        let value: Value = serde_json::from_str(frame).map_err(|e| {
            ProtocolError::InvalidServerInfo {
                reason: e.to_string(),
            }
        })?;
        match value.get("name") {
            Some(Value::String(name)) => Ok(ServerInfo { name: name.clone() }),
            Some(other) => Err(ProtocolError::InvalidServerInfo {
                reason: format!("`name` is not a string: {}", other),
            }),
            None => Err(ProtocolError::InvalidServerInfo {
                reason: "missing `name`".to_string(),
            }),
        }
    }

    /// History response: an array of `[username, text, timestamp]` triples
    pub fn parse_history(frame: &str) -> Result<Vec<HistoryEntry>, ProtocolError> {
        let rows = parse_array(RequestKind::History, frame)?;
        rows.into_iter()
            .enumerate()
            .map(|(index, row)| history_entry(index, row))
            .collect()
    }

    /// User-list response: an array of names
    pub fn parse_user_list(frame: &str) -> Result<Vec<String>, ProtocolError> {
        let rows = parse_array(RequestKind::UserList, frame)?;
        rows.into_iter()
            .map(|row| match row {
                Value::String(name) => Ok(name),
                other => Err(invalid_response(
                    RequestKind::UserList,
                    format!("expected a name, got {}", other),
                )),
            })
            .collect()
    }

    pub fn parse_response(request: RequestKind, frame: &str) -> Result<Response, ProtocolError> {
        match request {
            RequestKind::History => Self::parse_history(frame).map(Response::History),
            RequestKind::UserList => Self::parse_user_list(frame).map(Response::UserList),
        }
    }
}

/// Whether a frame is a JSON array, i.e. shaped like a request response
pub fn is_response_frame(frame: &str) -> bool {
    frame.trim_start().starts_with('[')
}

fn invalid_response(request: RequestKind, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidResponse {
        request: request.name(),
        reason: reason.into(),
    }
}

fn parse_array(request: RequestKind, frame: &str) -> Result<Vec<Value>, ProtocolError> {
    match serde_json::from_str(frame) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(other) => Err(invalid_response(
            request,
            format!("expected an array, got {}", json_type(&other)),
        )),
        Err(e) => Err(invalid_response(request, e.to_string())),
    }
}

fn history_entry(index: usize, row: Value) -> Result<HistoryEntry, ProtocolError> {
    let fields = match row {
        Value::Array(fields) if fields.len() == 3 => fields,
        other => {
            return Err(invalid_response(
                RequestKind::History,
                format!("entry {} is not a [username, text, timestamp] triple: {}", index, other),
            ))
        }
    };
    let mut fields = fields.into_iter().map(scalar_text);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(Some(username)), Some(Some(text)), Some(Some(timestamp))) => Ok(HistoryEntry {
            username,
            text,
            timestamp,
        }),
        _ => Err(invalid_response(
            RequestKind::History,
            format!("entry {} has a non-scalar field", index),
        )),
    }
}

// Timestamps may arrive as strings or numbers depending on the server
fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
