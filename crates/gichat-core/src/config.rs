//! Session configuration
//!
//! The session core receives all of its settings as one explicit
//! `SessionConfig` value at construction time. Nothing here is mutated after
//! the runner starts, and nothing is read from process-wide state.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{GichatError, GichatResult};
use crate::types::ServerEndpoint;

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Command/event bridge sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of the command queue (UI → Runner). Once full, the oldest
    /// queued command is dropped and the overflow is reported as an Error event.
    pub command_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32, // UI commands are infrequent
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Timeouts
// ----------------------------------------------------------------------------

/// Deadlines for the three blocking-capable runner operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Opening the transport
    pub connect_timeout_ms: u64,
    /// Each in-band response during the handshake (server info, history, user list)
    pub handshake_timeout_ms: u64,
    /// Waiting for the peer to acknowledge a close frame
    pub close_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            close_timeout_ms: 3_000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn close(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Post-Handshake Policy
// ----------------------------------------------------------------------------

/// What to do when the initial history or user-list request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostHandshakePolicy {
    /// Report the failure as an Error event and stay connected
    #[default]
    Degrade,
    /// Report the failure and tear the connection down
    Abort,
}

// ----------------------------------------------------------------------------
// Attachment Configuration
// ----------------------------------------------------------------------------

/// Inline and out-of-band attachment settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Base URL of the companion upload endpoint (`POST <upload_url>/upload`).
    /// `None` disables out-of-band uploads.
    pub upload_url: Option<String>,
    /// Path segment under `upload_url` where stored files are served
    pub download_path: String,
    /// Largest frame the transport accepts; inline attachments whose encoded
    /// envelope exceeds it are rejected before sending
    pub max_frame_bytes: usize,
    /// Timeout for a single upload or fetch request
    pub request_timeout_ms: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            upload_url: None,
            download_path: "uploads".to_string(),
            max_frame_bytes: 16 * 1024 * 1024, // tungstenite's default max frame size
            request_timeout_ms: 30_000,
        }
    }
}

impl AttachmentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Everything the session needs, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Username sent as the raw identity frame
    pub identity: String,
    /// Chat server address
    pub endpoint: ServerEndpoint,
    /// Optional admin secret attached to outgoing chat messages
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub post_handshake: PostHandshakePolicy,
    #[serde(default)]
    pub attachments: AttachmentConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    /// Issue a Connect as soon as the runner starts
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

fn default_auto_connect() -> bool {
    true
}

impl SessionConfig {
    /// Create a configuration with default settings for the given identity and server
    pub fn new(identity: impl Into<String>, endpoint: ServerEndpoint) -> Self {
        Self {
            identity: identity.into(),
            endpoint,
            admin_key: None,
            timeouts: TimeoutConfig::default(),
            post_handshake: PostHandshakePolicy::default(),
            attachments: AttachmentConfig::default(),
            channels: ChannelConfig::default(),
            auto_connect: default_auto_connect(),
        }
    }

    pub fn with_admin_key(mut self, admin_key: impl Into<String>) -> Self {
        self.admin_key = Some(admin_key.into());
        self
    }

    pub fn with_post_handshake(mut self, policy: PostHandshakePolicy) -> Self {
        self.post_handshake = policy;
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.attachments.upload_url = Some(upload_url.into());
        self
    }

    /// Presence checks only; values are otherwise taken as given
    pub fn validate(&self) -> GichatResult<()> {
        if self.identity.trim().is_empty() {
            return Err(GichatError::configuration("identity must not be empty"));
        }
        if self.endpoint.host.trim().is_empty() {
            return Err(GichatError::configuration("server host must not be empty"));
        }
        if self.endpoint.port == 0 {
            return Err(GichatError::configuration("server port must be set"));
        }
        if self.channels.command_buffer_size == 0 {
            return Err(GichatError::configuration(
                "command buffer size must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
