//! WebSocket link to the transcription server.
//!
//! A link is opened per session start and replaced wholesale on restart;
//! the session guarantees close-before-open so at most one link is ever
//! live. Audio packets flow out through a bounded queue; inbound messages
//! are parsed and handed to the session for classification.

use std::sync::{Arc, Mutex};

use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{InboundMessage, OutboundMessage};
use crate::error::LinkError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Connecting,
    Open,
    Closing,
}

// Encoded blocks waiting for the socket. A full queue drops the block;
// transcription tolerates gaps, playback must never stall behind them.
const OUTBOUND_QUEUE_PACKETS: usize = 64;

/// Cheap cloneable handle for feeding encoded packets into a link.
#[derive(Clone)]
pub struct LinkSender {
    state: Arc<Mutex<LinkState>>,
    packets: mpsc::Sender<Vec<u8>>,
}

impl LinkSender {
    /// Queue one packet. Silently dropped unless the link is Open.
    pub fn send(&self, packet: Vec<u8>) {
        if *self.state.lock().unwrap() != LinkState::Open {
            debug!("dropping packet: link not open");
            return;
        }
        if self.packets.try_send(packet).is_err() {
            debug!("dropping packet: outbound queue full");
        }
    }
}

pub struct TransportLink {
    endpoint: String,
    state: Arc<Mutex<LinkState>>,
    packets: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl TransportLink {
    /// Connect to `endpoint`, send the metadata handshake, and spawn the
    /// send/receive loops. Parsed inbound messages are delivered on
    /// `inbound_tx`.
    pub async fn open(
        endpoint: &str,
        wire_sample_rate: u32,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Result<Self, LinkError> {
        let state = Arc::new(Mutex::new(LinkState::Connecting));
        info!("opening transcription link to {}", endpoint);

        let connect_failed = |reason: String| LinkError::ConnectFailed {
            url: endpoint.to_string(),
            reason,
        };

        let (ws, _) = connect_async(endpoint)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        let (mut ws_tx, ws_rx) = ws.split();

        // Metadata handshake, once per open.
        let metadata = OutboundMessage::Metadata {
            sample_rate: wire_sample_rate,
        };
        let payload =
            serde_json::to_string(&metadata).map_err(|e| connect_failed(e.to_string()))?;
        ws_tx
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        *state.lock().unwrap() = LinkState::Open;
        info!("link open, declared sample rate {} Hz", wire_sample_rate);

        let (packet_tx, packet_rx) = mpsc::channel(OUTBOUND_QUEUE_PACKETS);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let writer = tokio::spawn(write_loop(
            ws_tx,
            packet_rx,
            Arc::clone(&state),
            shutdown_rx.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            ws_rx,
            inbound_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        Ok(Self {
            endpoint: endpoint.to_string(),
            state,
            packets: packet_tx,
            shutdown: shutdown_tx,
            writer: Some(writer),
            reader: Some(reader),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap()
    }

    pub fn sender(&self) -> LinkSender {
        LinkSender {
            state: Arc::clone(&self.state),
            packets: self.packets.clone(),
        }
    }

    /// Close and release the socket. Safe to call more than once. Also
    /// reaps the loops when the server closed the connection first.
    pub async fn close(&mut self) {
        if self.writer.is_none() && self.reader.is_none() {
            *self.state.lock().unwrap() = LinkState::Closed;
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            if *state != LinkState::Closed {
                *state = LinkState::Closing;
            }
        }
        info!("closing transcription link to {}", self.endpoint);
        let _ = self.shutdown.send(true);
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        *self.state.lock().unwrap() = LinkState::Closed;
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut packets: mpsc::Receiver<Vec<u8>>,
    state: Arc<Mutex<LinkState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            packet = packets.recv() => {
                let Some(packet) = packet else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                let message = OutboundMessage::Audio {
                    data: base64::engine::general_purpose::STANDARD.encode(&packet),
                };
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("failed to encode audio message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(payload.into())).await {
                    warn!("link send failed: {}", e);
                    *state.lock().unwrap() = LinkState::Closed;
                    break;
                }
            }
        }
    }
}

async fn read_loop(
    mut ws_rx: SplitStream<WsStream>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    state: Arc<Mutex<LinkState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = ws_rx.next() => {
                let Some(next) = next else {
                    debug!("server closed the link");
                    *state.lock().unwrap() = LinkState::Closed;
                    break;
                };
                let message = match next {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("link receive error: {}", e);
                        *state.lock().unwrap() = LinkState::Closed;
                        break;
                    }
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => {
                        *state.lock().unwrap() = LinkState::Closed;
                        break;
                    }
                    _ => continue,
                };
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(InboundMessage::Unknown) => debug!("ignoring unrecognized message type"),
                    Ok(message) => {
                        if inbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    // Malformed payloads are dropped; the link stays up.
                    Err(e) => warn!("dropping malformed server message: {}", e),
                }
            }
        }
    }
}
