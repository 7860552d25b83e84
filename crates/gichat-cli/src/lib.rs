//! GIchat CLI library
//!
//! Configuration loading, argument parsing and the line-oriented terminal
//! front end for the `gichat` binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod terminal_interface;

pub use cli::Cli;
pub use config::{AppConfig, ConfigStatus};
pub use error::{CliError, Result};
pub use terminal_interface::TerminalInterface;
