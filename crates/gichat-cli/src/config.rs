//! GIchat CLI Configuration Management
//!
//! The client reads a single TOML file:
//! - `[client]`: username and optional admin key
//! - `[server]`: chat server host and port
//! - `[session]`: timeouts and connect behavior (optional)
//! - `[attachments]`: companion upload server settings (optional)
//!
//! A missing file is written out with defaults and a random username so the
//! user can review it before the first connect. Command line flags take
//! priority over the file.

use std::fs;
use std::path::{Path, PathBuf};

use gichat_core::{
    AttachmentConfig, ChannelConfig, PostHandshakePolicy, ServerEndpoint, SessionConfig,
    TimeoutConfig,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// File name used when no `--config` is given
pub const CONFIG_FILE_NAME: &str = "config.toml";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the GIchat CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionOptions,
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

/// Who this client is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub username: String,
    /// Empty means no admin key
    #[serde(default)]
    pub admin_key: String,
}

/// Where the chat server lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Session tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub post_handshake: PostHandshakePolicy,
    pub auto_connect: bool,
    pub command_buffer_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let timeouts = TimeoutConfig::default();
        Self {
            connect_timeout_ms: timeouts.connect_timeout_ms,
            handshake_timeout_ms: timeouts.handshake_timeout_ms,
            close_timeout_ms: timeouts.close_timeout_ms,
            post_handshake: PostHandshakePolicy::default(),
            auto_connect: true,
            command_buffer_size: ChannelConfig::default().command_buffer_size,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig {
                username: random_username(),
                admin_key: String::new(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8765,
            },
            session: SessionOptions::default(),
            attachments: AttachmentConfig::default(),
        }
    }
}

/// `NewUser_<n>` with n in 1..=10000
pub fn random_username() -> String {
    format!("NewUser_{}", rand::thread_rng().gen_range(1..=10_000))
}

/// Result of looking for the configuration file
#[derive(Debug)]
pub enum ConfigStatus {
    Loaded(AppConfig),
    /// No file existed; defaults were written to this path
    Created(PathBuf),
}

// ----------------------------------------------------------------------------
// Loading and Saving
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file, or write defaults there if it does not exist yet
    pub fn load_or_init(path: &Path) -> Result<ConfigStatus> {
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ConfigStatus::Loaded(Self::load_from_file(path)?));
        }

        let config = Self::default();
        config.save_to_file(path)?;
        info!("Wrote default configuration to: {}", path.display());
        Ok(ConfigStatus::Created(path.to_path_buf()))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Command line flags win over file values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(username) = &cli.username {
            self.client.username = username.clone();
        }
    }

    /// Build the session configuration handed to the runner
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let endpoint = ServerEndpoint::new(self.server.host.clone(), self.server.port);
        let mut config = SessionConfig::new(self.client.username.clone(), endpoint)
            .with_post_handshake(self.session.post_handshake)
            .with_auto_connect(self.session.auto_connect);

        if !self.client.admin_key.is_empty() {
            config = config.with_admin_key(self.client.admin_key.clone());
        }
        config.timeouts = TimeoutConfig {
            connect_timeout_ms: self.session.connect_timeout_ms,
            handshake_timeout_ms: self.session.handshake_timeout_ms,
            close_timeout_ms: self.session.close_timeout_ms,
        };
        config.channels = ChannelConfig {
            command_buffer_size: self.session.command_buffer_size,
        };
        config.attachments = self.attachments.clone();

        config
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok(config)
    }
}

/// `--config`, else `<config dir>/gichat/config.toml`, else `./config.toml`
pub fn resolve_config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    dirs::config_dir()
        .map(|dir| dir.join("gichat").join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
