//! Frame Transport Trait Definitions
//!
//! The session runner talks to the chat server through these two traits.
//! `WebSocketConnector` is the production implementation; tests plug in
//! in-memory transports.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gichat_core::{ServerEndpoint, TransportError};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// One inbound data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// An open, exclusively owned connection to the chat server
///
/// `next_frame` must be cancel-safe: the runner races it against the
/// command queue and drops the losing future.
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one text frame
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError>;

    /// Next data frame; `None` once the peer has closed the connection
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Send a close frame with `reason` and wait for the peer to acknowledge.
    /// Callers bound the wait with their own deadline.
    async fn close(&mut self, reason: &str) -> Result<(), TransportError>;
}

/// Opens transports to a server endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Box<dyn FrameTransport>, TransportError>;

    /// Round-trip time to the endpoint's host, independent of any session
    async fn probe(
        &self,
        endpoint: &ServerEndpoint,
        deadline: Duration,
    ) -> Result<Duration, TransportError> {
        probe_tcp(endpoint, deadline).await
    }
}

/// Time a TCP connect to `host:port`; the stream is dropped straight away
pub async fn probe_tcp(
    endpoint: &ServerEndpoint,
    deadline: Duration,
) -> Result<Duration, TransportError> {
    let started = Instant::now();
    let stream = tokio::time::timeout(
        deadline,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| TransportError::Timeout {
        operation: "ping",
        duration: deadline,
    })?
    .map_err(|e| TransportError::ConnectionFailed {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let rtt = started.elapsed();
    drop(stream);
    debug!("Probe of {} answered in {:?}", endpoint, rtt);
    Ok(rtt)
}

// ----------------------------------------------------------------------------
// WebSocket Implementation
// ----------------------------------------------------------------------------

/// Dials `ws://host:port`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Box<dyn FrameTransport>, TransportError> {
        let uri = endpoint.ws_uri();
        debug!("Opening WebSocket to {}", uri);
        let (stream, _response) =
            connect_async(uri.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    endpoint: uri.clone(),
                    reason: e.to_string(),
                })?;
        Ok(Box::new(WebSocketTransport::new(stream)))
    }
}

/// WebSocket connection owned by the session runner
pub struct WebSocketTransport<S = MaybeTlsStream<TcpStream>> {
    stream: WebSocketStream<S>,
}

impl<S> WebSocketTransport<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> FrameTransport for WebSocketTransport<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })
    }

    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(InboundFrame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(InboundFrame::Binary(bytes))),
                Ok(Message::Close(frame)) => {
                    debug!("Peer closed connection: {:?}", frame);
                    return None;
                }
                // Ping replies are queued by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => {
                    return Some(Err(TransportError::ReceiveFailed {
                        reason: e.to_string(),
                    }))
                }
            }
        }
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => {
                return Err(TransportError::SendFailed {
                    reason: e.to_string(),
                })
            }
        }

        // Drain until the peer's close frame arrives
        while let Some(message) = self.stream.next().await {
            if message.is_err() {
                break;
            }
        }
        Ok(())
    }
}
