//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gichat", author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Chat server host (overrides the config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Chat server port (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Username to join with (overrides the config file)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Ring the terminal bell on incoming activity
    #[arg(long)]
    pub bell: bool,
}
