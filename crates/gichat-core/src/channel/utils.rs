//! Channel Utilities for the Command/Event Bridge
//!
//! This module provides the two halves of the bridge:
//! - command queue: bounded, backed by `tokio::sync::broadcast` so that a
//!   full queue drops its *oldest* entry instead of blocking or rejecting the
//!   submitter; the receiving side learns how many commands were lost
//! - event stream: unbounded `tokio::sync::mpsc`, so the runner never waits
//!   on a slow foreground and no event is ever dropped

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::channel::communication::{Command, Event};
use crate::config::ChannelConfig;
use crate::errors::ChannelError;

// ----------------------------------------------------------------------------
// Channel Health Monitoring
// ----------------------------------------------------------------------------

/// Channel statistics for monitoring
/// Uses atomic counters so both ends can update them concurrently
#[derive(Debug)]
pub struct ChannelStats {
    pub channel_type: &'static str,
    pub buffer_size: Option<usize>,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl ChannelStats {
    pub fn new(channel_type: &'static str, buffer_size: Option<usize>) -> Self {
        Self {
            channel_type,
            buffer_size,
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Record successful message send (thread-safe)
    pub fn record_send_success(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dropped messages (thread-safe)
    pub fn record_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current drop rate (thread-safe)
    pub fn drop_rate(&self) -> f32 {
        let sent = self.messages_sent();
        let dropped = self.messages_dropped();

        if sent == 0 {
            0.0
        } else {
            dropped as f32 / sent as f32
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Command Queue (Foreground → Runner)
// ----------------------------------------------------------------------------

/// Submitting end of the command queue. Cheap to clone; any actor may hold one.
#[derive(Debug, Clone)]
pub struct CommandSender {
    inner: broadcast::Sender<Command>,
    stats: Arc<ChannelStats>,
}

impl CommandSender {
    /// Enqueue a command without blocking.
    ///
    /// A full queue never fails the call: the oldest queued command is
    /// dropped and the runner reports the overflow. The only error is a
    /// runner that no longer exists.
    pub fn submit(&self, command: Command) -> Result<(), ChannelError> {
        match self.inner.send(command) {
            Ok(_) => {
                self.stats.record_send_success();
                Ok(())
            }
            Err(_) => Err(ChannelError::ChannelClosed),
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

/// What the runner pulls off the command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedCommand {
    Command(Command),
    /// The queue overflowed and this many of the oldest commands were lost
    Overflow { dropped: u64 },
}

/// Draining end of the command queue, owned by the runner
#[derive(Debug)]
pub struct CommandReceiver {
    inner: broadcast::Receiver<Command>,
    stats: Arc<ChannelStats>,
}

impl CommandReceiver {
    /// Wait for the next command. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ReceivedCommand> {
        let result = self.inner.recv().await;
        self.map_result(result)
    }

    /// Non-blocking variant, `Ok(None)` when the queue is empty
    pub fn try_recv(&mut self) -> Result<Option<ReceivedCommand>, ChannelError> {
        match self.inner.try_recv() {
            Ok(command) => Ok(Some(ReceivedCommand::Command(command))),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(dropped)) => {
                Ok(Some(self.overflow(dropped)))
            }
            Err(broadcast::error::TryRecvError::Closed) => Err(ChannelError::ChannelClosed),
        }
    }

    fn map_result(
        &self,
        result: Result<Command, broadcast::error::RecvError>,
    ) -> Option<ReceivedCommand> {
        match result {
            Ok(command) => Some(ReceivedCommand::Command(command)),
            Err(broadcast::error::RecvError::Lagged(dropped)) => Some(self.overflow(dropped)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    fn overflow(&self, dropped: u64) -> ReceivedCommand {
        self.stats.record_dropped(dropped);
        warn!(
            "Command queue overflow: dropped {} oldest command(s) (capacity {:?})",
            dropped, self.stats.buffer_size
        );
        ReceivedCommand::Overflow { dropped }
    }
}

// ----------------------------------------------------------------------------
// Event Stream (Runner → Foreground)
// ----------------------------------------------------------------------------

/// Emitting end of the event stream, owned by the runner
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<Event>,
    stats: Arc<ChannelStats>,
}

impl EventSender {
    /// Deliver an event. Fails only when the subscriber is gone.
    pub fn emit(&self, event: Event) -> Result<(), ChannelError> {
        self.inner
            .send(event)
            .map_err(|_| ChannelError::ReceiverDropped)?;
        self.stats.record_send_success();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

/// The single foreground subscription to session events
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Next event in emission order. `None` once the runner has stopped and
    /// every queued event has been delivered.
    pub async fn recv(&mut self) -> Option<Event> {
        self.inner.recv().await
    }

    /// Non-blocking poll for UI loops that cannot await
    pub fn try_recv(&mut self) -> Result<Option<Event>, ChannelError> {
        match self.inner.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(ChannelError::ChannelClosed),
        }
    }

    /// Blocking receive for a foreground thread outside any async runtime
    pub fn blocking_recv(&mut self) -> Option<Event> {
        self.inner.blocking_recv()
    }
}

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create the bounded, drop-oldest command queue (Foreground → Runner)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    // broadcast::channel panics on a zero capacity
    let capacity = config.command_buffer_size.max(1);
    let (sender, receiver) = broadcast::channel(capacity);
    let stats = Arc::new(ChannelStats::new("command", Some(capacity)));
    (
        CommandSender {
            inner: sender,
            stats: Arc::clone(&stats),
        },
        CommandReceiver {
            inner: receiver,
            stats,
        },
    )
}

/// Create the unbounded event stream (Runner → Foreground)
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let stats = Arc::new(ChannelStats::new("event", None));
    (
        EventSender {
            inner: sender,
            stats,
        },
        EventReceiver { inner: receiver },
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::communication::ErrorScope;

    #[test]
    fn test_channel_stats() {
        let stats = ChannelStats::new("test", Some(100));
        assert_eq!(stats.drop_rate(), 0.0);

        stats.record_send_success();
        stats.record_send_success();
        stats.record_dropped(1);

        assert_eq!(stats.messages_sent(), 2);
        assert_eq!(stats.messages_dropped(), 1);
        assert!((stats.drop_rate() - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_command_channel_fifo() {
        let (sender, mut receiver) = create_command_channel(&ChannelConfig::default());

        sender.submit(Command::Connect).unwrap();
        sender.submit(Command::SendText("hello".into())).unwrap();

        assert_eq!(
            receiver.recv().await,
            Some(ReceivedCommand::Command(Command::Connect))
        );
        assert_eq!(
            receiver.recv().await,
            Some(ReceivedCommand::Command(Command::SendText("hello".into())))
        );
    }

    #[tokio::test]
    async fn test_full_command_queue_drops_oldest() {
        let config = ChannelConfig {
            command_buffer_size: 2,
        };
        let (sender, mut receiver) = create_command_channel(&config);

        // Submitting past capacity never blocks or fails
        for i in 0..4 {
            sender.submit(Command::SendText(format!("m{}", i))).unwrap();
        }

        assert_eq!(
            receiver.recv().await,
            Some(ReceivedCommand::Overflow { dropped: 2 })
        );
        assert_eq!(
            receiver.recv().await,
            Some(ReceivedCommand::Command(Command::SendText("m2".into())))
        );
        assert_eq!(
            receiver.recv().await,
            Some(ReceivedCommand::Command(Command::SendText("m3".into())))
        );
        assert_eq!(sender.stats().messages_dropped(), 2);
    }

    #[tokio::test]
    async fn test_command_receiver_closes_with_senders() {
        let (sender, mut receiver) = create_command_channel(&ChannelConfig::default());
        sender.submit(Command::Shutdown).unwrap();
        drop(sender);

        assert_eq!(
            receiver.recv().await,
            Some(ReceivedCommand::Command(Command::Shutdown))
        );
        assert_eq!(receiver.recv().await, None);
    }

    #[test]
    fn test_submit_fails_once_runner_is_gone() {
        let (sender, receiver) = create_command_channel(&ChannelConfig::default());
        drop(receiver);
        assert_eq!(
            sender.submit(Command::Connect),
            Err(ChannelError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_event_channel_preserves_order() {
        let (sender, mut receiver) = create_event_channel();
        for i in 0..100 {
            sender
                .emit(Event::error(ErrorScope::Protocol, format!("e{}", i)))
                .unwrap();
        }
        drop(sender);

        let mut seen = Vec::new();
        while let Some(Event::Error { message, .. }) = receiver.recv().await {
            seen.push(message);
        }
        let expected: Vec<String> = (0..100).map(|i| format!("e{}", i)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_event_recv_wakes_on_emit() {
        let (sender, mut receiver) = create_event_channel();
        let mut recv = tokio_test::task::spawn(receiver.recv());
        tokio_test::assert_pending!(recv.poll());

        sender.emit(Event::HistoryReset).unwrap();
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(Event::HistoryReset));
    }

    #[test]
    fn test_emit_reports_missing_subscriber() {
        let (sender, receiver) = create_event_channel();
        drop(receiver);
        assert!(sender.is_closed());
        assert_eq!(
            sender.emit(Event::HistoryReset),
            Err(ChannelError::ReceiverDropped)
        );
    }

    #[test]
    fn test_try_recv_on_empty_queues() {
        let (_command_sender, mut commands) = create_command_channel(&ChannelConfig::default());
        assert_eq!(commands.try_recv(), Ok(None));

        let (_event_sender, mut events) = create_event_channel();
        assert_eq!(events.try_recv().unwrap(), None);
    }
}
