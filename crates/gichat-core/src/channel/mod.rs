//! Channel Module
//!
//! This module contains the command/event bridge between the foreground
//! actor and the session runner:
//! - `communication`: Command and Event types exchanged across the bridge
//! - `utils`: channel wrappers, overflow policy and statistics

pub mod communication;
pub mod utils;

// Re-export communication types
pub use communication::{
    AttachmentMode, Command, Cue, DisconnectReason, ErrorScope, Event, ImageSource, NoticeKind,
};

// Re-export ChannelConfig from config module
pub use crate::config::ChannelConfig;

// Re-export utility types
pub use utils::{
    create_command_channel, create_event_channel, ChannelStats, CommandReceiver, CommandSender,
    EventReceiver, EventSender, ReceivedCommand,
};
