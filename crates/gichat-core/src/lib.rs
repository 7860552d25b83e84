//! GIchat Session Core
//!
//! This crate provides the I/O-free half of the GIchat client session layer:
//! the wire envelope codec, attachment encoding, the connection state machine
//! and the command/event bridge that separates the foreground actor from the
//! session runner. Network and file I/O live in `gichat-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use types::{HistoryEntry, ServerEndpoint, Timestamp};

pub use channel::{
    create_command_channel, create_event_channel, AttachmentMode, ChannelStats, Command,
    CommandReceiver, CommandSender, Cue, DisconnectReason, ErrorScope, Event, EventReceiver,
    EventSender, ImageSource, NoticeKind, ReceivedCommand,
};

pub use config::{
    AttachmentConfig, ChannelConfig, PostHandshakePolicy, SessionConfig, TimeoutConfig,
};

pub use protocol::{
    Envelope, EnvelopeKind, Inbound, InlineAttachment, MediaLink, RequestKind, Response,
    SessionEffect, SessionEvent, SessionState, SessionStatus, WireCodec, WireEvent,
};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

pub use errors::{
    AttachmentError, ChannelError, GichatError, GichatResult, ProtocolError, TransportError,
};
pub use protocol::StateTransitionError;
