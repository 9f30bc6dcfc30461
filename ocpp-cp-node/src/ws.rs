//! WebSocket link to the central system
//!
//! The engine is synchronous, so the socket lives in its own task and talks
//! to the engine through unbounded channels. [`WsTransport`] is the engine's
//! end of those channels.
//!
//! Handles:
//! - WebSocket connection with the `ocpp1.6` subprotocol
//! - Automatic reconnection with exponential backoff
//! - Rejecting calls for unknown actions with `NotImplemented`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use ocpp_core::frame::{self, CallErrorPayload, ErrorCode, FrameError};
use ocpp_core::{InboundMessage, Message, Transport, TransportError};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header, HeaderValue},
        protocol::WebSocketConfig,
        Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

/// OCPP 1.6 JSON WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// Connection settings
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Central system WebSocket URL (without station id)
    pub csms_url: String,

    /// Charge point identity, appended to the URL
    pub station_id: String,

    /// Initial reconnect delay
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay (exponential backoff cap)
    pub max_reconnect_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            csms_url: "ws://localhost:8180/steve/websocket/CentralSystemService".to_string(),
            station_id: "CP-001".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
        }
    }
}

impl LinkConfig {
    pub fn url(&self) -> String {
        format!("{}/{}", self.csms_url.trim_end_matches('/'), self.station_id)
    }
}

/// Connection state changes reported to the engine loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid subprotocol header")]
    Header(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
}

/// Engine-side end of the link
#[derive(Debug)]
pub struct WsTransport {
    outgoing: UnboundedSender<String>,
    incoming: UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    fn reject_unknown_action(&self, message_id: String, action: &str) {
        warn!("Rejecting call {} for unknown action {}", message_id, action);

        let error = CallErrorPayload::new(
            ErrorCode::NotImplemented,
            format!("Action {} is not implemented", action),
        );
        let frame = serde_json::json!([
            4,
            message_id,
            error.error_code,
            error.error_description,
            error.error_details
        ]);
        let _ = self.outgoing.send(frame.to_string());
    }
}

impl Transport for WsTransport {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        let text = frame::encode(message).map_err(|e| TransportError::Send(e.to_string()))?;
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Disconnected)
    }

    fn receive(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        loop {
            let text = match self.incoming.try_recv() {
                Ok(text) => text,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(TransportError::Disconnected),
            };

            match frame::decode(text.as_bytes()) {
                Ok(inbound) => return Ok(Some(inbound)),
                Err(FrameError::UnknownAction { message_id, action }) => {
                    self.reject_unknown_action(message_id, &action);
                }
                Err(e) => warn!("Dropping malformed frame: {}", e),
            }
        }
    }
}

/// Start the connection task; returns the engine's transport and a stream of
/// connection events
pub fn spawn(config: LinkConfig) -> (WsTransport, UnboundedReceiver<LinkEvent>) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(false));

    let link = Link {
        config,
        outgoing: outgoing_rx,
        incoming: incoming_tx,
        events: events_tx,
        connected: connected.clone(),
    };
    tokio::spawn(link.run());

    let transport = WsTransport {
        outgoing: outgoing_tx,
        incoming: incoming_rx,
        connected,
    };
    (transport, events_rx)
}

/// Empty the outgoing channel; returns how many frames were dropped.
///
/// Frames left over from a dead connection belong to the old session.
/// Requests among them are re-sent by the engine after their timeout.
fn discard_pending(outgoing: &mut UnboundedReceiver<String>) -> usize {
    let mut count = 0;
    while let Ok(text) = outgoing.try_recv() {
        debug!("Discarding: {}", text);
        count += 1;
    }
    count
}

/// How a connection ended
enum Ended {
    /// Socket closed; reconnect
    Closed,
    /// Engine side went away; stop
    Shutdown,
}

struct Link {
    config: LinkConfig,
    outgoing: UnboundedReceiver<String>,
    incoming: UnboundedSender<String>,
    events: UnboundedSender<LinkEvent>,
    connected: Arc<AtomicBool>,
}

impl Link {
    /// Run the connection loop until the engine side is dropped
    async fn run(mut self) {
        let mut reconnect_delay = self.config.reconnect_delay;

        loop {
            info!("Connecting to central system: {}", self.config.url());

            match self.connect_and_run().await {
                Ok(Ended::Shutdown) => {
                    info!("Engine gone, closing link");
                    return;
                }
                Ok(Ended::Closed) => {
                    info!("Connection closed");
                    reconnect_delay = self.config.reconnect_delay;
                }
                Err(e) => error!("Connection error: {}", e),
            }

            if self.connected.swap(false, Ordering::SeqCst) {
                let _ = self.events.send(LinkEvent::Disconnected);
            }

            // Exponential backoff
            info!("Reconnecting in {:?}", reconnect_delay);
            tokio::time::sleep(reconnect_delay).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, self.config.max_reconnect_delay);
        }
    }

    /// Connect and pump frames until disconnection
    async fn connect_and_run(&mut self) -> Result<Ended, LinkError> {
        let url = self.config.url();
        let mut request = url.as_str().into_client_request()?;
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(OCPP_SUBPROTOCOL)?,
        );

        let ws_config = WebSocketConfig {
            max_message_size: Some(64 * 1024),
            max_frame_size: Some(16 * 1024),
            ..Default::default()
        };
        let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false).await?;

        // Verify subprotocol
        let accepted_protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        if accepted_protocol != Some(OCPP_SUBPROTOCOL) {
            warn!(
                "Central system did not accept the OCPP 1.6 subprotocol, got: {:?}",
                accepted_protocol
            );
        }

        info!("WebSocket connected to {}", url);
        let stale = discard_pending(&mut self.outgoing);
        if stale > 0 {
            info!("Discarded {} frames queued before the connection dropped", stale);
        }
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::Connected);

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            debug!("Received: {}", text);
                            if self.incoming.send(text.to_string()).is_err() {
                                return Ok(Ended::Shutdown);
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("WebSocket closed by server");
                            return Ok(Ended::Closed);
                        }
                        Some(Ok(WsMessage::Ping(_))) => {
                            // Pong is sent by tungstenite
                            debug!("Received ping");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("WebSocket stream ended");
                            return Ok(Ended::Closed);
                        }
                    }
                }

                out = self.outgoing.recv() => {
                    let Some(text) = out else {
                        return Ok(Ended::Shutdown);
                    };
                    debug!("Sending: {}", text);
                    ws_tx.send(WsMessage::Text(text.into())).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::{MessageId, MessageRole, MessageType};

    fn transport() -> (WsTransport, UnboundedReceiver<String>, UnboundedSender<String>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let transport = WsTransport {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            connected: Arc::new(AtomicBool::new(true)),
        };
        (transport, outgoing_rx, incoming_tx)
    }

    fn heartbeat() -> Message {
        Message {
            id: MessageId::new("hb-1").unwrap(),
            role: MessageRole::Call,
            message_type: MessageType::Heartbeat,
            payload: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_url_joins_station() {
        let config = LinkConfig {
            csms_url: "ws://csms/ocpp/".into(),
            station_id: "CP7".into(),
            ..Default::default()
        };
        assert_eq!(config.url(), "ws://csms/ocpp/CP7");
    }

    #[test]
    fn test_send_encodes_frame() {
        let (mut transport, mut wire, _inbox) = transport();
        transport.send(&heartbeat()).unwrap();
        assert_eq!(wire.try_recv().unwrap(), r#"[2,"hb-1","Heartbeat",{}]"#);
    }

    #[test]
    fn test_send_fails_while_disconnected() {
        let (mut transport, _wire, _inbox) = transport();
        transport.connected.store(false, Ordering::SeqCst);
        assert!(matches!(
            transport.send(&heartbeat()),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_stale_frames_discarded_on_connect() {
        let (mut transport, mut wire, _inbox) = transport();
        transport.send(&heartbeat()).unwrap();
        transport.send(&heartbeat()).unwrap();

        assert_eq!(discard_pending(&mut wire), 2);
        assert!(wire.try_recv().is_err());
        assert_eq!(discard_pending(&mut wire), 0);
    }

    #[test]
    fn test_receive_skips_bad_frames() {
        let (mut transport, mut wire, inbox) = transport();
        assert!(transport.receive().unwrap().is_none());

        inbox.send("garbage".into()).unwrap();
        inbox.send(r#"[2,"x1","Teleport",{}]"#.into()).unwrap();
        inbox.send(r#"[3,"hb-1",{"currentTime":"2024-01-01T00:00:00Z"}]"#.into()).unwrap();

        let inbound = transport.receive().unwrap().unwrap();
        assert_eq!(inbound.id, "hb-1");
        assert_eq!(inbound.role, MessageRole::CallResult);

        // The unknown action was answered directly
        assert_eq!(
            wire.try_recv().unwrap(),
            r#"[4,"x1","NotImplemented","Action Teleport is not implemented",{}]"#
        );
    }
}
