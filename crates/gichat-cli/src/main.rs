//! GIchat CLI - main entry point

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use gichat_cli::{
    cli::Cli,
    config::{resolve_config_path, AppConfig, ConfigStatus},
    terminal_interface::TerminalInterface,
};
use gichat_core::Command;
use gichat_runtime::start_session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let path = resolve_config_path(&cli);
    let mut config = match AppConfig::load_or_init(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?
    {
        ConfigStatus::Loaded(config) => config,
        ConfigStatus::Created(path) => {
            println!(
                "Created a default configuration at {}. Review it, then start gichat again.",
                path.display()
            );
            return Ok(());
        }
    };
    config.apply_overrides(&cli);
    let session_config = config.to_session_config()?;
    let username = session_config.identity.clone();

    // Start the session runner
    let mut session = start_session(session_config)
        .await
        .context("failed to start session")?;
    let events = session
        .take_event_receiver()
        .context("event receiver already taken")?;

    let interrupt = session.command_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; shutting down");
            let _ = interrupt.submit(Command::Shutdown);
        }
    });

    println!("Type /help for commands.");
    let interface = TerminalInterface::new(username, session.command_sender(), events)
        .with_bell(cli.bell);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let result = interface.run(stdin, &mut stdout).await;

    if let Err(e) = session.shutdown().await {
        warn!("Session did not shut down cleanly: {}", e);
    }
    result?;

    info!("GIchat CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout carries chat lines only
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
