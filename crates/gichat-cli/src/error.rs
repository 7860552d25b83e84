//! Error handling for the GIchat CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("GIchat session error: {0}")]
    Session(#[from] gichat_core::GichatError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command bridge error: {0}")]
    Bridge(#[from] gichat_core::ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
