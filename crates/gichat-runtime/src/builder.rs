//! Session Builder API
//!
//! Provides a builder-style API for consumers (CLI/tests) to start the
//! session runner and get the foreground half of the command/event bridge.

use std::sync::Arc;

use gichat_core::{
    channel::{create_command_channel, create_event_channel, CommandSender, EventReceiver},
    ChannelError, Command, GichatError, GichatResult, SessionConfig, SessionStatus,
};
use tokio::{sync::watch, task::JoinHandle, time::Duration};
use tracing::info;

use crate::attachments::MediaClient;
use crate::runner::SessionRunner;
use crate::transport::{Connector, WebSocketConnector};

/// How long `shutdown` waits for the runner before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Session Builder
// ----------------------------------------------------------------------------

/// Builder for the session runner
pub struct SessionBuilder {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
}

impl SessionBuilder {
    /// Create a builder that dials real WebSocket servers
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            connector: Arc::new(WebSocketConnector),
        }
    }

    /// Replace the transport connector
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Validate the configuration, spawn the runner and return its handle
    pub async fn build_and_start(self) -> GichatResult<SessionHandle> {
        self.config.validate()?;
        info!(
            "Starting GIchat session for {} ({})",
            self.config.identity, self.config.endpoint
        );

        let media = MediaClient::new(&self.config.attachments)?;
        let (command_sender, command_receiver) = create_command_channel(&self.config.channels);
        let (event_sender, event_receiver) = create_event_channel();
        let (status_sender, status_receiver) = watch::channel(SessionStatus::Disconnected);

        let runner = SessionRunner::new(
            Arc::new(self.config),
            self.connector,
            media,
            command_receiver,
            event_sender,
            status_sender,
        );
        let runner_handle = tokio::spawn(runner.run());

        Ok(SessionHandle {
            command_sender,
            event_receiver: Some(event_receiver),
            status: status_receiver,
            runner_handle: Some(runner_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Foreground handle to a running session
pub struct SessionHandle {
    command_sender: CommandSender,
    event_receiver: Option<EventReceiver>,
    status: watch::Receiver<SessionStatus>,
    runner_handle: Option<JoinHandle<GichatResult<()>>>,
}

impl SessionHandle {
    /// Enqueue a command; never blocks
    pub fn submit(&self, command: Command) -> Result<(), ChannelError> {
        self.command_sender.submit(command)
    }

    /// Get a command sender for other actors
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.event_receiver.take()
    }

    /// Current session state
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch session state changes
    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Check if the runner is still running
    pub fn is_running(&self) -> bool {
        self.runner_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the runner to complete
    pub async fn wait(&mut self) -> GichatResult<()> {
        match self.runner_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| GichatError::runtime(format!("session runner panicked: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Shutdown the session gracefully
    pub async fn shutdown(&mut self) -> GichatResult<()> {
        info!("Shutting down GIchat session");

        // The runner may already be gone
        let _ = self.submit(Command::Shutdown);

        if let Some(mut handle) = self.runner_handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => {
                    return Err(GichatError::runtime(format!(
                        "session runner panicked: {}",
                        e
                    )))
                }
                Err(_) => handle.abort(),
            }
        }

        info!("GIchat session shut down");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Start a session against a real WebSocket server
pub async fn start_session(config: SessionConfig) -> GichatResult<SessionHandle> {
    SessionBuilder::new(config).build_and_start().await
}
