//! Linear Session State Machine
//!
//! The session moves through five declared states. Each transition consumes
//! the current state and yields the next one together with the effects the
//! runner must execute, so an undeclared state can never be observed.
//!
//! Connecting a session is a two-phase protocol:
//! - handshake (state `Connecting`): open the transport, send the identity
//!   as a raw text frame, read the server-info object
//! - initial sync and steady state (state `Connected`): request history and
//!   the user list, each answered by the next inbound frame, then route
//!   inbound frames concurrently with commands

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::communication::{DisconnectReason, ErrorScope, Event};
use crate::types::Timestamp;

/// Close reason used when the client tears down the connection itself
pub const CLIENT_DISCONNECT_REASON: &str = "Client Disconnect";

// ----------------------------------------------------------------------------
// Session State Types
// ----------------------------------------------------------------------------

/// Linear session state that must be consumed to transition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport handle exists
    #[default]
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Handshake complete, transport handle live
    Connected { server_name: String },
    /// Close frame sent, waiting for acknowledgement
    Disconnecting { reason: DisconnectReason },
    /// Runner has stopped; terminal
    Exited,
}

/// Payload-free view of the state, published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Exited,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "Disconnected",
            SessionStatus::Connecting => "Connecting",
            SessionStatus::Connected => "Connected",
            SessionStatus::Disconnecting => "Disconnecting",
            SessionStatus::Exited => "Exited",
        };
        write!(f, "{}", name)
    }
}

// ----------------------------------------------------------------------------
// State Transition Events
// ----------------------------------------------------------------------------

/// Inputs that drive the state machine, from commands or from the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Connect command
    Connect,
    /// Reconnect command, applied once the session is disconnected
    Reconnect,
    /// Server-info received and parsed
    HandshakeSucceeded { server_name: String },
    /// Transport or server-info failure during the handshake
    HandshakeFailed { scope: ErrorScope, reason: String },
    /// Disconnect command
    Disconnect { reason: String },
    /// Peer closed the connection or a read failed
    RemoteClosed,
    /// Server notice addressed to this client says it was kicked
    Kicked,
    /// Close acknowledged or close deadline elapsed
    CloseCompleted,
    /// Shutdown command
    Shutdown,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connect => "Connect",
            SessionEvent::Reconnect => "Reconnect",
            SessionEvent::HandshakeSucceeded { .. } => "HandshakeSucceeded",
            SessionEvent::HandshakeFailed { .. } => "HandshakeFailed",
            SessionEvent::Disconnect { .. } => "Disconnect",
            SessionEvent::RemoteClosed => "RemoteClosed",
            SessionEvent::Kicked => "Kicked",
            SessionEvent::CloseCompleted => "CloseCompleted",
            SessionEvent::Shutdown => "Shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Work the runner performs after a transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Open the transport and run the handshake
    OpenConnection,
    /// Issue the initial history and user-list requests
    RequestInitialData,
    /// Send a close frame and wait (bounded) for the acknowledgement
    SendCloseFrame { reason: String },
    /// Drop the transport handle
    ReleaseHandle,
    /// Cancel the in-flight handshake, dropping its socket
    AbortHandshake,
    /// Deliver an event to the foreground
    Emit(Event),
    /// Stop the runner
    Terminate,
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// New session state
    pub new_state: SessionState,
    /// Effects to execute as result of transition
    pub effects: Vec<SessionEffect>,
    /// Audit trail entry
    pub audit_entry: AuditEntry,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub from_state: String,
    pub to_state: String,
    pub event: String,
    pub effects_count: usize,
}

// ----------------------------------------------------------------------------
// State Machine Implementation
// ----------------------------------------------------------------------------

impl SessionState {
    /// Get current state name for logging/audit
    pub fn state_name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected { .. } => "Connected",
            SessionState::Disconnecting { .. } => "Disconnecting",
            SessionState::Exited => "Exited",
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Disconnected => SessionStatus::Disconnected,
            SessionState::Connecting => SessionStatus::Connecting,
            SessionState::Connected { .. } => SessionStatus::Connected,
            SessionState::Disconnecting { .. } => SessionStatus::Disconnecting,
            SessionState::Exited => SessionStatus::Exited,
        }
    }

    /// Check if state allows message sending
    pub fn can_send_messages(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    /// Whether a transport handle may exist in this state
    pub fn holds_connection(&self) -> bool {
        matches!(
            self,
            SessionState::Connected { .. } | SessionState::Disconnecting { .. }
        )
    }

    /// Reject commands that need a live connection
    pub fn require_connected(&self) -> Result<(), StateTransitionError> {
        if self.can_send_messages() {
            Ok(())
        } else {
            Err(StateTransitionError::NotConnected)
        }
    }

    /// Process an event and transition to new state (consumes self)
    pub fn transition(self, event: SessionEvent) -> Result<StateTransition, StateTransitionError> {
        let from_state = self.state_name().to_string();
        let event_name = event.name();

        let (new_state, effects) = match (self, event) {
            // From Disconnected
            (SessionState::Disconnected, SessionEvent::Connect)
            | (SessionState::Disconnected, SessionEvent::Reconnect) => (
                SessionState::Connecting,
                vec![SessionEffect::OpenConnection],
            ),

            // From Connecting
            (SessionState::Connecting, SessionEvent::HandshakeSucceeded { server_name }) => {
                let effects = vec![
                    SessionEffect::Emit(Event::Connected {
                        server_name: server_name.clone(),
                    }),
                    SessionEffect::RequestInitialData,
                ];
                (SessionState::Connected { server_name }, effects)
            }

            (SessionState::Connecting, SessionEvent::HandshakeFailed { scope, reason }) => (
                SessionState::Disconnected,
                vec![SessionEffect::Emit(Event::error(
                    scope,
                    format!("connect failed: {}", reason),
                ))],
            ),

            (SessionState::Connecting, SessionEvent::Disconnect { reason }) => (
                SessionState::Disconnected,
                vec![
                    SessionEffect::AbortHandshake,
                    SessionEffect::Emit(Event::Disconnected {
                        reason: DisconnectReason::Client(reason),
                    }),
                ],
            ),

            // From Connected
            (SessionState::Connected { .. }, SessionEvent::Disconnect { reason }) => (
                SessionState::Disconnecting {
                    reason: DisconnectReason::Client(reason.clone()),
                },
                vec![SessionEffect::SendCloseFrame { reason }],
            ),

            (SessionState::Connected { .. }, SessionEvent::RemoteClosed) => (
                SessionState::Disconnected,
                vec![
                    SessionEffect::ReleaseHandle,
                    SessionEffect::Emit(Event::Disconnected {
                        reason: DisconnectReason::Remote,
                    }),
                ],
            ),

            (SessionState::Connected { .. }, SessionEvent::Kicked) => (
                SessionState::Disconnecting {
                    reason: DisconnectReason::Kick,
                },
                vec![SessionEffect::SendCloseFrame {
                    reason: DisconnectReason::Kick.to_string(),
                }],
            ),

            // From Disconnecting
            (SessionState::Disconnecting { reason }, SessionEvent::CloseCompleted) => (
                SessionState::Disconnected,
                vec![
                    SessionEffect::ReleaseHandle,
                    SessionEffect::Emit(Event::Disconnected { reason }),
                ],
            ),

            // Shutdown from every live state
            (SessionState::Disconnected, SessionEvent::Shutdown) => {
                (SessionState::Exited, vec![SessionEffect::Terminate])
            }

            (SessionState::Connecting, SessionEvent::Shutdown) => (
                SessionState::Exited,
                vec![
                    SessionEffect::AbortHandshake,
                    SessionEffect::Emit(Event::Disconnected {
                        reason: DisconnectReason::Client(CLIENT_DISCONNECT_REASON.to_string()),
                    }),
                    SessionEffect::Terminate,
                ],
            ),

            (SessionState::Connected { .. }, SessionEvent::Shutdown) => {
                let reason = CLIENT_DISCONNECT_REASON.to_string();
                (
                    SessionState::Exited,
                    vec![
                        SessionEffect::SendCloseFrame {
                            reason: reason.clone(),
                        },
                        SessionEffect::ReleaseHandle,
                        SessionEffect::Emit(Event::Disconnected {
                            reason: DisconnectReason::Client(reason),
                        }),
                        SessionEffect::Terminate,
                    ],
                )
            }

            // The close frame is already out; only the wait is cut short
            (SessionState::Disconnecting { reason }, SessionEvent::Shutdown) => (
                SessionState::Exited,
                vec![
                    SessionEffect::ReleaseHandle,
                    SessionEffect::Emit(Event::Disconnected { reason }),
                    SessionEffect::Terminate,
                ],
            ),

            // Invalid transitions
            (SessionState::Exited, _) => return Err(StateTransitionError::Terminated),

            (
                SessionState::Connecting | SessionState::Connected { .. },
                SessionEvent::Connect | SessionEvent::Reconnect,
            ) => return Err(StateTransitionError::AlreadyConnected),

            (SessionState::Disconnected, SessionEvent::Disconnect { .. }) => {
                return Err(StateTransitionError::NotConnected)
            }

            (_, event) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: from_state.clone(),
                    event: event_name.to_string(),
                    reason: format!("Event {:?} not valid for state {}", event, from_state),
                })
            }
        };

        let to_state = new_state.state_name().to_string();
        let audit_entry = AuditEntry {
            timestamp: Timestamp::now(),
            from_state,
            to_state,
            event: event_name.to_string(),
            effects_count: effects.len(),
        };

        Ok(StateTransition {
            new_state,
            effects,
            audit_entry,
        })
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    /// Connect or Reconnect while a connection exists or is being opened
    #[error("already connected")]
    AlreadyConnected,
    /// Operation needs a live connection
    #[error("not connected")]
    NotConnected,
    /// The session has exited
    #[error("session has exited")]
    Terminated,
    /// Invalid state transition attempted
    #[error("Invalid transition from {from_state} on event {event}: {reason}")]
    InvalidTransition {
        from_state: String,
        event: String,
        reason: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
