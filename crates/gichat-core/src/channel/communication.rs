//! Command/Event Protocol Types
//!
//! This module defines the typed protocol between the foreground actor and
//! the session runner. All cross-actor communication flows through these
//! values; none of them is mutated after it has been submitted or emitted.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{HistoryEntry, Timestamp};

// ----------------------------------------------------------------------------
// Command: Foreground → Session Runner
// ----------------------------------------------------------------------------

/// Requests from the foreground actor to the session runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Open the connection and run the handshake
    Connect,
    /// Close the connection with the given reason
    Disconnect(String),
    /// Disconnect (if connected), then connect again
    Reconnect,
    /// Send a chat message
    SendText(String),
    /// Send a file using the chosen attachment mechanism
    SendFile { path: PathBuf, mode: AttachmentMode },
    /// Ask the server for the stored message history
    RequestHistory,
    /// Ask the server for the online user list
    RequestUserList,
    /// Download an out-of-band attachment referenced by URL
    FetchMedia(String),
    /// Measure how long the server host takes to accept a connection
    Ping,
    /// Disconnect best-effort and stop the runner
    Shutdown,
}

impl Command {
    /// Inline file send, the mechanism every peer understands
    pub fn send_file(path: impl Into<PathBuf>) -> Self {
        Command::SendFile {
            path: path.into(),
            mode: AttachmentMode::Inline,
        }
    }

    /// Out-of-band upload followed by an `[Image] <url>` message
    pub fn upload_file(path: impl Into<PathBuf>) -> Self {
        Command::SendFile {
            path: path.into(),
            mode: AttachmentMode::Upload,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect => "Connect",
            Command::Disconnect(_) => "Disconnect",
            Command::Reconnect => "Reconnect",
            Command::SendText(_) => "SendText",
            Command::SendFile { .. } => "SendFile",
            Command::RequestHistory => "RequestHistory",
            Command::RequestUserList => "RequestUserList",
            Command::FetchMedia(_) => "FetchMedia",
            Command::Ping => "Ping",
            Command::Shutdown => "Shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Event: Session Runner → Foreground
// ----------------------------------------------------------------------------

/// Notifications from the session runner, delivered in emission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Handshake completed with the named server
    Connected { server_name: String },
    /// The connection is gone
    Disconnected { reason: DisconnectReason },
    /// Plain chat message
    TextReceived {
        username: String,
        text: String,
        timestamp: Timestamp,
    },
    /// Image sent inline or referenced by URL
    ImageReceived {
        username: String,
        image: ImageSource,
        timestamp: Timestamp,
    },
    /// `[File] <url>` message
    FileLinkReceived {
        username: String,
        url: String,
        timestamp: Timestamp,
    },
    /// Server notice, tagged with the sub-case it matched
    SystemNotice {
        username: String,
        text: String,
        kind: NoticeKind,
    },
    /// Server asked clients to discard their message history
    HistoryReset,
    /// Stored messages, oldest first
    HistoryBatch { entries: Vec<HistoryEntry> },
    /// Users currently online
    UserListUpdated { users: Vec<String> },
    /// A chat message left this client
    MessageSent { text: String, timestamp: Timestamp },
    /// An attachment left this client
    AttachmentSent {
        filename: String,
        mode: AttachmentMode,
        timestamp: Timestamp,
    },
    /// Result of a `FetchMedia` command
    MediaFetched { url: String, bytes: Vec<u8> },
    /// Result of a `Ping` command; `None` when the host is unreachable
    PingResult { rtt: Option<Duration> },
    /// Recoverable failure scoped to one operation
    Error { scope: ErrorScope, message: String },
}

impl Event {
    pub fn error(scope: ErrorScope, message: impl Into<String>) -> Self {
        Event::Error {
            scope,
            message: message.into(),
        }
    }

    /// Side-channel cue for the sound/notification collaborator
    pub fn cue(&self) -> Option<Cue> {
        match self {
            Event::Connected { .. } => Some(Cue::Connect),
            Event::Disconnected {
                reason: DisconnectReason::Kick,
            } => Some(Cue::Kick),
            Event::Disconnected { .. } => Some(Cue::Disconnect),
            Event::TextReceived { .. }
            | Event::ImageReceived { .. }
            | Event::FileLinkReceived { .. } => Some(Cue::Receive),
            Event::SystemNotice { kind, .. } => match kind {
                NoticeKind::Join => Some(Cue::Join),
                NoticeKind::Leave => Some(Cue::Leave),
                NoticeKind::Kick => Some(Cue::Kick),
                NoticeKind::General => None,
            },
            Event::MessageSent { .. } | Event::AttachmentSent { .. } => Some(Cue::Send),
            Event::Error { .. } => Some(Cue::Error),
            Event::HistoryReset
            | Event::HistoryBatch { .. }
            | Event::UserListUpdated { .. }
            | Event::MediaFetched { .. }
            | Event::PingResult { .. } => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// How a file leaves the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentMode {
    /// Base64 bytes embedded in a `file` envelope
    Inline,
    /// Uploaded to the companion endpoint and sent as `[Image] <url>`
    Upload,
}

impl fmt::Display for AttachmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentMode::Inline => write!(f, "inline"),
            AttachmentMode::Upload => write!(f, "upload"),
        }
    }
}

/// Where received image data lives
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    Inline { filename: String, bytes: Vec<u8> },
    Url(String),
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Inline { filename, bytes } => f
                .debug_struct("Inline")
                .field("filename", filename)
                .field("len", &bytes.len())
                .finish(),
            ImageSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

/// Why the connection ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Requested by this client
    Client(String),
    /// Closed or lost by the remote side
    Remote,
    /// The server removed this client
    Kick,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Client(reason) => write!(f, "{}", reason),
            DisconnectReason::Remote => write!(f, "remote"),
            DisconnectReason::Kick => write!(f, "kick"),
        }
    }
}

/// Sub-case of a server notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeKind {
    Join,
    Leave,
    Kick,
    General,
}

/// Error taxonomy carried by `Event::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorScope {
    Transport,
    Protocol,
    Attachment,
    Bridge,
    InvalidCommand,
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Transport => write!(f, "transport"),
            ErrorScope::Protocol => write!(f, "protocol"),
            ErrorScope::Attachment => write!(f, "attachment"),
            ErrorScope::Bridge => write!(f, "bridge"),
            ErrorScope::InvalidCommand => write!(f, "command"),
        }
    }
}

/// Feedback cue names, matching the client's sound assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cue {
    Connect,
    Disconnect,
    Join,
    Leave,
    Kick,
    Receive,
    Send,
    Error,
}

impl Cue {
    /// Asset name used by the notification collaborator
    pub fn asset_name(&self) -> &'static str {
        match self {
            Cue::Connect => "connect",
            Cue::Disconnect => "disconnect",
            Cue::Join => "join",
            Cue::Leave => "leave",
            Cue::Kick => "kick",
            Cue::Receive => "rcv_message",
            Cue::Send => "send_message",
            Cue::Error => "error",
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
