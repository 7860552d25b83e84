//! GIchat Protocol Module
//!
//! This module contains the client side of the chat protocol:
//! - `envelope`: wire envelope types
//! - `codec`: envelope encoding, strict decoding and classification
//! - `attachment`: inline base64 payloads and media-link URLs
//! - `session_state`: connection state machine

pub mod attachment;
pub mod codec;
pub mod envelope;
pub mod session_state;

// Re-export envelope types
pub use envelope::{Envelope, EnvelopeKind, RequestKind, ServerInfo, WireEvent};

// Re-export codec types
pub use codec::{is_response_frame, notice_kind, Inbound, Response, WireCodec, CLEAR_MESSAGE_DB};

// Re-export attachment types
pub use attachment::{
    base64_len, check_frame_size, file_name, media_url, upload_endpoint, InlineAttachment, MediaLink,
};

// Re-export session state types
pub use session_state::{
    AuditEntry, SessionEffect, SessionEvent, SessionState, SessionStatus, StateTransition,
    StateTransitionError, CLIENT_DISCONNECT_REASON,
};
