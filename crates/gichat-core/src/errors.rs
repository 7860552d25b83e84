//! Error types for the GIchat session core
//!
//! This module contains the error types used throughout the session layer:
//! transport errors, protocol (framing) errors, attachment errors, bridge
//! errors, and the `GichatError` type that unifies them all.

use std::time::Duration;

use crate::protocol::session_state::StateTransitionError;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the network transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },
    #[error("Transport timeout during {operation} after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },
    #[error("Connection closed by peer")]
    Closed,
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },
}

/// Errors raised while decoding or interpreting a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },
    #[error("invalid frame: missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("invalid frame: envelope carries both a text message and binary data")]
    ConflictingPayload,
    #[error("invalid server info: {reason}")]
    InvalidServerInfo { reason: String },
    #[error("invalid response to {request}: {reason}")]
    InvalidResponse {
        request: &'static str,
        reason: String,
    },
    #[error("no response to {request} within {duration:?}")]
    ResponseTimeout {
        request: &'static str,
        duration: Duration,
    },
    #[error("envelope encoding failed: {reason}")]
    EncodeFailed { reason: String },
}

impl ProtocolError {
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }
}

/// Errors raised by inline or out-of-band attachment handling
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment unreadable: {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("attachment too large: {size} bytes encoded (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("attachment payload is not valid base64: {reason}")]
    InvalidEncoding { reason: String },
    #[error("upload endpoint not configured")]
    UploadUnavailable,
    #[error("upload failed: {reason}")]
    UploadFailed { reason: String },
    #[error("invalid media URL: {reason}")]
    InvalidUrl { reason: String },
    #[error("fetch of {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },
}

/// Errors raised by the command/event bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    ChannelClosed,
    #[error("Channel receiver was dropped")]
    ReceiverDropped,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Unified error type for the session core
#[derive(Debug, thiserror::Error)]
pub enum GichatError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Invalid state transition: {0}")]
    InvalidState(#[from] StateTransitionError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Runtime error: {reason}")]
    Runtime { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GichatError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime {
            reason: reason.into(),
        }
    }
}

pub type GichatResult<T> = core::result::Result<T, GichatError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
