//! Shared test utilities: an in-memory chat server peer and a scripted connector

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gichat_core::{
    EventReceiver, Event, ServerEndpoint, SessionConfig, TimeoutConfig, TransportError,
};
use gichat_runtime::{Connector, FrameTransport, InboundFrame};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const TEST_SERVER_NAME: &str = "Test Server";
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// In-Memory Transport
// ----------------------------------------------------------------------------

enum PeerFrame {
    Frame(InboundFrame),
    Fail(String),
    Close,
}

/// Client half of an in-memory connection
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<PeerFrame>,
    outgoing: mpsc::UnboundedSender<String>,
    close_reasons: Arc<Mutex<Vec<String>>>,
    live: Arc<AtomicUsize>,
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameTransport for MockTransport {
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::SendFailed {
                reason: "peer gone".to_string(),
            })
    }

    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        match self.incoming.recv().await {
            Some(PeerFrame::Frame(frame)) => Some(Ok(frame)),
            Some(PeerFrame::Fail(reason)) => Some(Err(TransportError::ReceiveFailed { reason })),
            Some(PeerFrame::Close) | None => None,
        }
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        self.close_reasons
            .lock()
            .unwrap()
            .push(reason.to_string());
        Ok(())
    }
}

/// Server half of an in-memory connection
pub struct MockPeer {
    to_client: mpsc::UnboundedSender<PeerFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
    close_reasons: Arc<Mutex<Vec<String>>>,
}

impl MockPeer {
    pub fn send(&self, frame: &str) {
        let _ = self
            .to_client
            .send(PeerFrame::Frame(InboundFrame::Text(frame.to_string())));
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        let _ = self.to_client.send(PeerFrame::Frame(InboundFrame::Binary(bytes)));
    }

    pub fn fail_read(&self, reason: &str) {
        let _ = self.to_client.send(PeerFrame::Fail(reason.to_string()));
    }

    /// Stop accepting client frames; later sends fail
    pub fn stop_reading(&mut self) {
        self.from_client.close();
    }

    /// Server closes the connection
    pub fn close(&self) {
        let _ = self.to_client.send(PeerFrame::Close);
    }

    /// Next frame the client sent
    pub async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.from_client.recv())
            .await
            .expect("client frame should arrive within timeout")
            .expect("client side should still be open")
    }

    /// Next frame the client sent, parsed as JSON
    pub async fn recv_json(&mut self) -> serde_json::Value {
        let frame = self.recv().await;
        serde_json::from_str(&frame).expect("client frame should be JSON")
    }

    pub fn close_reasons(&self) -> Vec<String> {
        self.close_reasons.lock().unwrap().clone()
    }

    /// Queue the server side of a complete connect: server info, history, user list
    pub fn script_connect(&self, history: &str, users: &str) {
        self.send(&format!(r#"{{"name":"{}"}}"#, TEST_SERVER_NAME));
        self.send(history);
        self.send(users);
    }
}

// ----------------------------------------------------------------------------
// Scripted Connector
// ----------------------------------------------------------------------------

/// Hands out pre-built transports in order; refuses once they run out
#[derive(Clone, Default)]
pub struct MockConnector {
    plans: Arc<Mutex<VecDeque<Option<MockTransport>>>>,
    live: Arc<AtomicUsize>,
    live_at_connect: Arc<Mutex<Vec<usize>>>,
    /// Probe answer; unreachable when unset
    probe_rtt: Arc<Mutex<Option<Duration>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the next connect; returns the server side of it
    pub fn accept_next(&self) -> MockPeer {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let close_reasons = Arc::new(Mutex::new(Vec::new()));

        self.live.fetch_add(1, Ordering::SeqCst);
        let transport = MockTransport {
            incoming,
            outgoing,
            close_reasons: Arc::clone(&close_reasons),
            live: Arc::clone(&self.live),
        };
        self.plans.lock().unwrap().push_back(Some(transport));

        MockPeer {
            to_client,
            from_client,
            close_reasons,
        }
    }

    /// Refuse the next connect
    pub fn refuse_next(&self) {
        self.plans.lock().unwrap().push_back(None);
    }

    /// Transports not yet dropped, counting queued ones
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Answer probes with this round-trip time
    pub fn reachable_in(&self, rtt: Duration) {
        *self.probe_rtt.lock().unwrap() = Some(rtt);
    }

    /// Live handle count observed at each connect
    pub fn live_at_connect(&self) -> Vec<usize> {
        self.live_at_connect.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Box<dyn FrameTransport>, TransportError> {
        let plan = self.plans.lock().unwrap().pop_front();
        match plan {
            Some(Some(transport)) => {
                // The handed-out transport itself is not counted
                let others = self.live.load(Ordering::SeqCst) - 1 - self.plans.lock().unwrap().len();
                self.live_at_connect.lock().unwrap().push(others);
                Ok(Box::new(transport))
            }
            Some(None) | None => Err(TransportError::ConnectionFailed {
                endpoint: endpoint.ws_uri(),
                reason: "connection refused".to_string(),
            }),
        }
    }

    async fn probe(
        &self,
        endpoint: &ServerEndpoint,
        _deadline: Duration,
    ) -> Result<Duration, TransportError> {
        let rtt = *self.probe_rtt.lock().unwrap();
        rtt.ok_or_else(|| TransportError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: "host unreachable".to_string(),
        })
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

pub fn create_test_config() -> SessionConfig {
    let mut config = SessionConfig::new("alice", ServerEndpoint::new("127.0.0.1", 8765));
    config.timeouts = TimeoutConfig {
        connect_timeout_ms: 500,
        handshake_timeout_ms: 500,
        close_timeout_ms: 200,
    };
    config
}

/// Next event, failing the test if none arrives in time
pub async fn next_event(events: &mut EventReceiver) -> Event {
    timeout(RECV_TIMEOUT, events.recv())
        .await
        .expect("event should arrive within timeout")
        .expect("event stream should still be open")
}
