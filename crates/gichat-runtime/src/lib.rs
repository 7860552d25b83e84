//! GIchat Session Runtime
//!
//! This crate contains the I/O half of the GIchat client session layer:
//! - `SessionRunner`: the background task owning the state machine and socket
//! - `transport`: the frame transport traits and their WebSocket implementation
//! - `handshake`: identity exchange and server-info read
//! - `attachments`: file reads, uploads and media fetches
//!
//! Consumers start a session through `SessionBuilder` and talk to it only
//! through the command/event bridge defined in `gichat-core`.

pub mod attachments;
pub mod builder;
pub mod handshake;
pub mod runner;
pub mod transport;

pub use attachments::{MediaClient, PreparedSend};
pub use builder::{start_session, SessionBuilder, SessionHandle};
pub use runner::{SessionRunner, INITIAL_SYNC_FAILED_REASON};
pub use transport::{
    probe_tcp, Connector, FrameTransport, InboundFrame, WebSocketConnector, WebSocketTransport,
};

// Re-export core types for convenience
pub use gichat_core::{
    channel::{CommandSender, EventReceiver, ReceivedCommand},
    AttachmentMode, Command, DisconnectReason, ErrorScope, Event, GichatError, GichatResult,
    ImageSource, NoticeKind, PostHandshakePolicy, ServerEndpoint, SessionConfig, SessionStatus,
};
