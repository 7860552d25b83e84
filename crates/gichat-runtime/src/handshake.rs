//! Connection handshake
//!
//! Phase one of a connect: open the transport, send the identity as a raw
//! text frame, then read the server-info object. The whole exchange is an
//! owned future so the runner can drop it when a Disconnect or Shutdown
//! arrives mid-handshake; dropping it closes the socket.

use std::sync::Arc;

use gichat_core::{
    protocol::{ServerInfo, WireCodec, CLIENT_DISCONNECT_REASON},
    ErrorScope, GichatError, GichatResult, ProtocolError, SessionConfig, TransportError,
};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::transport::{Connector, FrameTransport, InboundFrame};

/// A transport that has completed the handshake
pub struct Handshake {
    pub connection: Box<dyn FrameTransport>,
    pub server: ServerInfo,
}

/// Run the handshake against the configured endpoint
pub async fn perform_handshake(
    connector: Arc<dyn Connector>,
    config: Arc<SessionConfig>,
    codec: WireCodec,
) -> GichatResult<Handshake> {
    let endpoint = &config.endpoint;
    let timeouts = &config.timeouts;

    let mut connection = timeout(timeouts.connect(), connector.connect(endpoint))
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "connect",
            duration: timeouts.connect(),
        })??;
    debug!("Transport to {} open, sending identity", endpoint);

    connection.send_text(codec.identity_frame()).await?;

    match read_server_info(connection.as_mut(), &config).await {
        Ok(server) => {
            info!("Connected to {} ({})", server.name, endpoint.ws_uri());
            Ok(Handshake { connection, server })
        }
        Err(error) => {
            // The socket is still healthy after a protocol failure
            if matches!(error, GichatError::Protocol(_)) {
                let _ = timeout(
                    timeouts.close(),
                    connection.close(CLIENT_DISCONNECT_REASON),
                )
                .await;
            }
            Err(error)
        }
    }
}

async fn read_server_info(
    connection: &mut dyn FrameTransport,
    config: &SessionConfig,
) -> GichatResult<ServerInfo> {
    let deadline = config.timeouts.handshake();
    let frame = timeout(deadline, connection.next_frame())
        .await
        .map_err(|_| ProtocolError::ResponseTimeout {
            request: "server info",
            duration: deadline,
        })?;

    match frame {
        None => Err(TransportError::Closed.into()),
        Some(Err(error)) => Err(error.into()),
        Some(Ok(InboundFrame::Binary(_))) => Err(ProtocolError::InvalidServerInfo {
            reason: "binary frame".to_string(),
        }
        .into()),
        Some(Ok(InboundFrame::Text(text))) => Ok(WireCodec::parse_server_info(&text)?),
    }
}

/// Which error taxonomy a handshake failure belongs to
pub fn failure_scope(error: &GichatError) -> ErrorScope {
    match error {
        GichatError::Protocol(ProtocolError::ResponseTimeout { .. }) => ErrorScope::Transport,
        GichatError::Protocol(_) | GichatError::Serialization(_) => ErrorScope::Protocol,
        _ => ErrorScope::Transport,
    }
}
