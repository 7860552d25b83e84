//! Session Runner
//!
//! The single background task that owns the session state machine and the
//! transport handle. It drains the command queue, reads inbound frames and
//! collects background task results (attachments, pings), all through one
//! `select!` loop, and reports everything to the foreground as events.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use gichat_core::{
    channel::{CommandReceiver, EventSender, ReceivedCommand},
    protocol::{
        is_response_frame, RequestKind, SessionEffect, SessionEvent, SessionState,
        SessionStatus, StateTransitionError, WireCodec, CLIENT_DISCONNECT_REASON,
    },
    AttachmentError, AttachmentMode, Command, ErrorScope, Event, GichatResult,
    PostHandshakePolicy, ProtocolError, SessionConfig, Timestamp, TransportError,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::attachments::{prepare_inline, prepare_upload, AttachmentOutcome, MediaClient};
use crate::handshake::{failure_scope, perform_handshake};
use crate::transport::{Connector, FrameTransport, InboundFrame};

/// Reason sent with the close frame when the initial sync aborts the session
pub const INITIAL_SYNC_FAILED_REASON: &str = "initial sync failed";

// ----------------------------------------------------------------------------
// Runner State
// ----------------------------------------------------------------------------

/// How an in-band request during the initial sync ended
enum SyncOutcome {
    Answered,
    Failed(ProtocolError),
    Lost(Option<TransportError>),
    Interrupted,
}

/// Result reported back by a task spawned off the runner
enum TaskOutcome {
    Attachment(AttachmentOutcome),
    Ping(Option<Duration>),
}

/// Background task owning the session
pub struct SessionRunner {
    config: Arc<SessionConfig>,
    codec: WireCodec,
    connector: Arc<dyn Connector>,
    media: MediaClient,

    state: SessionState,
    connection: Option<Box<dyn FrameTransport>>,
    /// Steady-state requests awaiting their array response, oldest first
    pending_requests: VecDeque<RequestKind>,
    /// Commands that arrived while a handshake or initial sync was running
    deferred: VecDeque<Command>,

    commands: CommandReceiver,
    events: EventSender,
    status: watch::Sender<SessionStatus>,
    task_sender: mpsc::UnboundedSender<TaskOutcome>,
    task_receiver: mpsc::UnboundedReceiver<TaskOutcome>,

    terminated: bool,
    bridge_lost: bool,
}

impl SessionRunner {
    pub fn new(
        config: Arc<SessionConfig>,
        connector: Arc<dyn Connector>,
        media: MediaClient,
        commands: CommandReceiver,
        events: EventSender,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        let (task_sender, task_receiver) = mpsc::unbounded_channel();
        Self {
            codec: WireCodec::from_config(&config),
            config,
            connector,
            media,
            state: SessionState::default(),
            connection: None,
            pending_requests: VecDeque::new(),
            deferred: VecDeque::new(),
            commands,
            events,
            status,
            task_sender,
            task_receiver,
            terminated: false,
            bridge_lost: false,
        }
    }

    /// Run until Shutdown, or until the foreground is gone
    pub async fn run(mut self) -> GichatResult<()> {
        info!(
            "Session runner started for {} at {}",
            self.config.identity, self.config.endpoint
        );

        if self.config.auto_connect {
            self.handle_command(Command::Connect).await;
        }

        while !self.terminated && !self.bridge_lost {
            self.step().await;
        }

        if self.bridge_lost && !self.terminated {
            error!("Event subscriber dropped; stopping session runner");
            self.drive(SessionEvent::Shutdown).await;
        }

        self.publish_status();
        info!("Session runner stopped");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Main Loop
    // ------------------------------------------------------------------------

    async fn step(&mut self) {
        if let Some(command) = self.deferred.pop_front() {
            self.handle_command(command).await;
            return;
        }

        let connection = self.connection.as_mut();
        tokio::select! {
            received = self.commands.recv() => self.handle_received(received).await,
            frame = next_frame(connection) => self.handle_frame(frame).await,
            Some(outcome) = self.task_receiver.recv() => match outcome {
                TaskOutcome::Attachment(outcome) => self.handle_attachment(outcome).await,
                TaskOutcome::Ping(rtt) => self.emit(Event::PingResult { rtt }),
            },
        }
    }

    async fn handle_received(&mut self, received: Option<ReceivedCommand>) {
        match received {
            Some(ReceivedCommand::Command(command)) => self.handle_command(command).await,
            Some(ReceivedCommand::Overflow { dropped }) => self.report_overflow(dropped),
            None => {
                info!("Command bridge closed; shutting down");
                self.handle_command(Command::Shutdown).await;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        debug!("Handling command {} in state {}", command.name(), self.state.state_name());
        match command {
            Command::Connect => self.drive(SessionEvent::Connect).await,
            Command::Reconnect => self.reconnect().await,
            Command::Disconnect(reason) => self.drive(SessionEvent::Disconnect { reason }).await,
            Command::Shutdown => self.drive(SessionEvent::Shutdown).await,
            Command::SendText(text) => self.send_text(text).await,
            Command::SendFile { path, mode } => self.send_file(path, mode),
            Command::RequestHistory => self.send_request(RequestKind::History).await,
            Command::RequestUserList => self.send_request(RequestKind::UserList).await,
            Command::FetchMedia(url) => self.fetch_media(url),
            Command::Ping => self.ping(),
        }
    }

    /// Full disconnect, handle released, then a fresh connect
    async fn reconnect(&mut self) {
        if let SessionState::Connected { .. } = self.state {
            info!("Reconnecting to {}", self.config.endpoint);
            self.drive(SessionEvent::Disconnect {
                reason: CLIENT_DISCONNECT_REASON.to_string(),
            })
            .await;
            if self.terminated || self.state != SessionState::Disconnected {
                return;
            }
        }
        self.drive(SessionEvent::Reconnect).await;
    }

    // ------------------------------------------------------------------------
    // State Machine Driver
    // ------------------------------------------------------------------------

    /// Apply an event and execute its effects, following up on any events
    /// the effects themselves produce
    async fn drive(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let effects = match self.apply(event) {
                Ok(effects) => effects,
                Err(error) => {
                    self.emit(Event::error(ErrorScope::InvalidCommand, error.to_string()));
                    continue;
                }
            };
            for effect in effects {
                if let Some(next) = self.execute(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    fn apply(&mut self, event: SessionEvent) -> Result<Vec<SessionEffect>, StateTransitionError> {
        let state = std::mem::take(&mut self.state);
        match state.clone().transition(event) {
            Ok(transition) => {
                debug!("Session transition: {:?}", transition.audit_entry);
                self.state = transition.new_state;
                self.publish_status();
                Ok(transition.effects)
            }
            Err(error) => {
                warn!("Rejected session event in state {}: {}", state.state_name(), error);
                self.state = state;
                Err(error)
            }
        }
    }

    async fn execute(&mut self, effect: SessionEffect) -> Option<SessionEvent> {
        match effect {
            SessionEffect::OpenConnection => self.open_connection().await,
            SessionEffect::RequestInitialData => self.initial_sync().await,
            SessionEffect::SendCloseFrame { reason } => {
                self.close_connection(&reason).await;
                match self.state {
                    SessionState::Disconnecting { .. } => Some(SessionEvent::CloseCompleted),
                    _ => None,
                }
            }
            SessionEffect::ReleaseHandle => {
                self.connection = None;
                self.pending_requests.clear();
                None
            }
            SessionEffect::AbortHandshake => {
                debug!("Handshake abandoned");
                None
            }
            SessionEffect::Emit(event) => {
                self.emit(event);
                None
            }
            SessionEffect::Terminate => {
                self.terminated = true;
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 1: Handshake
    // ------------------------------------------------------------------------

    async fn open_connection(&mut self) -> Option<SessionEvent> {
        // At most one live handle
        if let Some(mut stale) = self.connection.take() {
            warn!("Closing stale transport before connecting");
            let _ = tokio::time::timeout(
                self.config.timeouts.close(),
                stale.close(CLIENT_DISCONNECT_REASON),
            )
            .await;
        }

        info!("Connecting to {}", self.config.endpoint.ws_uri());
        let handshake = perform_handshake(
            Arc::clone(&self.connector),
            Arc::clone(&self.config),
            self.codec.clone(),
        );
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                result = &mut handshake => {
                    return Some(match result {
                        Ok(handshake) => {
                            self.connection = Some(handshake.connection);
                            SessionEvent::HandshakeSucceeded { server_name: handshake.server.name }
                        }
                        Err(error) => {
                            warn!("Handshake failed: {}", error);
                            SessionEvent::HandshakeFailed {
                                scope: failure_scope(&error),
                                reason: error.to_string(),
                            }
                        }
                    });
                }
                received = self.commands.recv() => {
                    if self.hold_command(received) {
                        return None;
                    }
                }
            }
        }
    }

    /// Triage a command arriving while the runner is busy with the
    /// handshake or initial sync. Returns `true` when it interrupts.
    fn hold_command(&mut self, received: Option<ReceivedCommand>) -> bool {
        match received {
            Some(ReceivedCommand::Command(command)) => match command {
                Command::Connect | Command::Reconnect => {
                    self.emit(Event::error(
                        ErrorScope::InvalidCommand,
                        StateTransitionError::AlreadyConnected.to_string(),
                    ));
                    false
                }
                Command::Disconnect(_) | Command::Shutdown => {
                    self.deferred.push_front(command);
                    true
                }
                other => {
                    self.deferred.push_back(other);
                    false
                }
            },
            Some(ReceivedCommand::Overflow { dropped }) => {
                self.report_overflow(dropped);
                false
            }
            None => {
                self.deferred.push_front(Command::Shutdown);
                true
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 1b: Initial Sync
    // ------------------------------------------------------------------------

    async fn initial_sync(&mut self) -> Option<SessionEvent> {
        for request in [RequestKind::History, RequestKind::UserList] {
            match self.sync_request(request).await {
                SyncOutcome::Answered => {}
                SyncOutcome::Failed(error) => {
                    self.emit(Event::error(
                        ErrorScope::Protocol,
                        format!("initial {} request failed: {}", request, error),
                    ));
                    if self.config.post_handshake == PostHandshakePolicy::Abort {
                        return Some(SessionEvent::Disconnect {
                            reason: INITIAL_SYNC_FAILED_REASON.to_string(),
                        });
                    }
                }
                SyncOutcome::Lost(error) => {
                    if let Some(error) = error {
                        self.emit(Event::error(ErrorScope::Transport, error.to_string()));
                    }
                    return Some(SessionEvent::RemoteClosed);
                }
                SyncOutcome::Interrupted => return None,
            }
        }
        None
    }

    /// One sequential request: the next inbound frame is its response
    async fn sync_request(&mut self, request: RequestKind) -> SyncOutcome {
        let frame = match WireCodec::to_frame(&self.codec.encode_request(request)) {
            Ok(frame) => frame,
            Err(error) => return SyncOutcome::Failed(error),
        };
        let Some(connection) = self.connection.as_mut() else {
            return SyncOutcome::Lost(None);
        };
        if let Err(error) = connection.send_text(frame).await {
            return SyncOutcome::Lost(Some(error));
        }
        debug!("Initial {} request sent", request);

        let duration = self.config.timeouts.handshake();
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            let Some(connection) = self.connection.as_mut() else {
                return SyncOutcome::Lost(None);
            };
            tokio::select! {
                frame = connection.next_frame() => {
                    return match frame {
                        None => SyncOutcome::Lost(None),
                        Some(Err(error)) => SyncOutcome::Lost(Some(error)),
                        Some(Ok(InboundFrame::Binary(_))) => SyncOutcome::Failed(
                            ProtocolError::invalid_frame("binary frame in response to a request"),
                        ),
                        Some(Ok(InboundFrame::Text(text))) => {
                            match WireCodec::parse_response(request, &text) {
                                Ok(response) => {
                                    self.emit(response.into_event());
                                    SyncOutcome::Answered
                                }
                                Err(error) => SyncOutcome::Failed(error),
                            }
                        }
                    };
                }
                _ = &mut deadline => {
                    return SyncOutcome::Failed(ProtocolError::ResponseTimeout {
                        request: request.name(),
                        duration,
                    });
                }
                received = self.commands.recv() => {
                    if self.hold_command(received) {
                        return SyncOutcome::Interrupted;
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 2: Steady State
    // ------------------------------------------------------------------------

    async fn handle_frame(&mut self, frame: Option<Result<InboundFrame, TransportError>>) {
        match frame {
            None => {
                info!("Connection closed by server");
                self.drive(SessionEvent::RemoteClosed).await;
            }
            Some(Err(error)) => {
                warn!("Read failed: {}", error);
                self.emit(Event::error(ErrorScope::Transport, error.to_string()));
                self.drive(SessionEvent::RemoteClosed).await;
            }
            Some(Ok(InboundFrame::Binary(bytes))) => {
                self.emit(Event::error(
                    ErrorScope::Protocol,
                    ProtocolError::invalid_frame(format!(
                        "unexpected binary frame ({} bytes)",
                        bytes.len()
                    ))
                    .to_string(),
                ));
            }
            Some(Ok(InboundFrame::Text(text))) => self.route_text(&text).await,
        }
    }

    async fn route_text(&mut self, text: &str) {
        if is_response_frame(text) {
            if let Some(request) = self.pending_requests.pop_front() {
                match WireCodec::parse_response(request, text) {
                    Ok(response) => self.emit(response.into_event()),
                    Err(error) => self.emit(Event::error(ErrorScope::Protocol, error.to_string())),
                }
                return;
            }
        }

        let inbound = match self.codec.decode_inbound(text) {
            Ok(inbound) => inbound,
            Err(error) => {
                debug!("Dropping malformed frame: {}", error);
                self.emit(Event::error(ErrorScope::Protocol, error.to_string()));
                return;
            }
        };

        let kicked = inbound.is_self_kick();
        match inbound.into_event(Timestamp::now()) {
            Some(event) => self.emit(event),
            None => debug!("Inbound frame ignored"),
        }
        if kicked {
            info!("Kicked by server");
            self.drive(SessionEvent::Kicked).await;
        }
    }

    // ------------------------------------------------------------------------
    // Outgoing Traffic
    // ------------------------------------------------------------------------

    /// Error event for commands that need a live connection; `false` if rejected
    fn ensure_connected(&mut self) -> bool {
        match self.state.require_connected() {
            Ok(()) => true,
            Err(error) => {
                self.emit(Event::error(ErrorScope::InvalidCommand, error.to_string()));
                false
            }
        }
    }

    async fn send_text(&mut self, text: String) {
        if !self.ensure_connected() {
            return;
        }
        if text.trim().is_empty() {
            self.emit(Event::error(ErrorScope::InvalidCommand, "message is empty"));
            return;
        }
        let frame = match WireCodec::to_frame(&self.codec.encode_text(&text)) {
            Ok(frame) => frame,
            Err(error) => {
                self.emit(Event::error(ErrorScope::Protocol, error.to_string()));
                return;
            }
        };
        if self.transmit(frame).await {
            self.emit(Event::MessageSent {
                text,
                timestamp: Timestamp::now(),
            });
        }
    }

    async fn send_request(&mut self, request: RequestKind) {
        if !self.ensure_connected() {
            return;
        }
        let frame = match WireCodec::to_frame(&self.codec.encode_request(request)) {
            Ok(frame) => frame,
            Err(error) => {
                self.emit(Event::error(ErrorScope::Protocol, error.to_string()));
                return;
            }
        };
        if self.transmit(frame).await {
            self.pending_requests.push_back(request);
        }
    }

    /// Put a frame on the wire; a failed send is a lost connection
    async fn transmit(&mut self, frame: String) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            self.emit(Event::error(
                ErrorScope::InvalidCommand,
                StateTransitionError::NotConnected.to_string(),
            ));
            return false;
        };
        match connection.send_text(frame).await {
            Ok(()) => true,
            Err(error) => {
                warn!("Send failed: {}", error);
                self.emit(Event::error(ErrorScope::Transport, error.to_string()));
                self.drive(SessionEvent::RemoteClosed).await;
                false
            }
        }
    }

    async fn close_connection(&mut self, reason: &str) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        info!("Closing connection: {}", reason);
        match tokio::time::timeout(self.config.timeouts.close(), connection.close(reason)).await {
            Ok(Ok(())) => debug!("Close acknowledged"),
            Ok(Err(error)) => debug!("Close failed: {}", error),
            Err(_) => debug!("Close not acknowledged within {:?}", self.config.timeouts.close()),
        }
    }

    // ------------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------------

    fn send_file(&mut self, path: std::path::PathBuf, mode: AttachmentMode) {
        if !self.ensure_connected() {
            return;
        }
        if mode == AttachmentMode::Upload && !self.media.can_upload() {
            self.emit(Event::error(
                ErrorScope::Attachment,
                AttachmentError::UploadUnavailable.to_string(),
            ));
            return;
        }

        debug!("Preparing {} attachment {}", mode, path.display());
        let codec = self.codec.clone();
        let media = self.media.clone();
        let max_frame_bytes = self.config.attachments.max_frame_bytes;
        let outcomes = self.task_sender.clone();

        tokio::spawn(async move {
            let prepared = match mode {
                AttachmentMode::Inline => prepare_inline(&codec, &path, max_frame_bytes).await,
                AttachmentMode::Upload => prepare_upload(&codec, &media, &path).await,
            };
            let outcome = match prepared {
                Ok(prepared) => AttachmentOutcome::Ready(prepared),
                Err(error) => AttachmentOutcome::Failed {
                    path: Some(path),
                    error,
                },
            };
            let _ = outcomes.send(TaskOutcome::Attachment(outcome));
        });
    }

    fn fetch_media(&mut self, url: String) {
        let media = self.media.clone();
        let outcomes = self.task_sender.clone();

        tokio::spawn(async move {
            let outcome = match media.fetch(&url).await {
                Ok(bytes) => AttachmentOutcome::Fetched { url, bytes },
                Err(error) => AttachmentOutcome::Failed { path: None, error },
            };
            let _ = outcomes.send(TaskOutcome::Attachment(outcome));
        });
    }

    // ------------------------------------------------------------------------
    // Ping
    // ------------------------------------------------------------------------

    /// Probe the server host off the runner; works in any state
    fn ping(&mut self) {
        let connector = Arc::clone(&self.connector);
        let config = Arc::clone(&self.config);
        let outcomes = self.task_sender.clone();

        tokio::spawn(async move {
            let deadline = config.timeouts.connect();
            let rtt = match connector.probe(&config.endpoint, deadline).await {
                Ok(rtt) => Some(rtt),
                Err(error) => {
                    warn!("Ping of {} failed: {}", config.endpoint, error);
                    None
                }
            };
            let _ = outcomes.send(TaskOutcome::Ping(rtt));
        });
    }

    async fn handle_attachment(&mut self, outcome: AttachmentOutcome) {
        match outcome {
            AttachmentOutcome::Ready(prepared) => {
                // The connection may have gone away while the task ran
                if !self.ensure_connected() {
                    return;
                }
                if self.transmit(prepared.frame).await {
                    self.emit(prepared.sent_event);
                }
            }
            AttachmentOutcome::Fetched { url, bytes } => {
                debug!("Fetched {} ({} bytes)", url, bytes.len());
                self.emit(Event::MediaFetched { url, bytes });
            }
            AttachmentOutcome::Failed { path, error } => {
                match path {
                    Some(path) => warn!("Attachment {} failed: {}", path.display(), error),
                    None => warn!("Attachment failed: {}", error),
                }
                self.emit(Event::error(ErrorScope::Attachment, error.to_string()));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Bridge
    // ------------------------------------------------------------------------

    fn emit(&mut self, event: Event) {
        if self.bridge_lost {
            return;
        }
        if self.events.emit(event).is_err() {
            self.bridge_lost = true;
        }
    }

    fn report_overflow(&mut self, dropped: u64) {
        self.emit(Event::error(
            ErrorScope::Bridge,
            format!("command queue overflow: {} command(s) dropped", dropped),
        ));
    }

    fn publish_status(&self) {
        self.status.send_replace(self.state.status());
    }
}

/// Next frame of the live connection; pending forever when there is none
async fn next_frame(
    connection: Option<&mut Box<dyn FrameTransport>>,
) -> Option<Result<InboundFrame, TransportError>> {
    match connection {
        Some(connection) => connection.next_frame().await,
        None => std::future::pending().await,
    }
}
