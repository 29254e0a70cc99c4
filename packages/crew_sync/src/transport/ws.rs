//! WebSocket transport over tokio-tungstenite.
//!
//! One connection = one handle. A background pump task owns the socket: it
//! forwards outbound commands from an mpsc queue and parses inbound text
//! frames into `TransportEvent`s, in delivery order. Closing cancels the pump
//! via a `CancellationToken`; dropping the handle cancels it too, so a
//! replaced handle can never keep a stale socket alive.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::protocol::{ClientCommand, ServerEvent, TransportEvent};

use super::{ConnectContext, Transport, TransportHandle};

/// Inbound events buffered before the session loop drains them.
const EVENT_BUFFER: usize = 256;
/// Outbound commands buffered before the pump flushes them.
const OUTBOUND_BUFFER: usize = 64;
/// Upper bound on the random jitter added to each retry delay.
const RETRY_JITTER_MS: u64 = 250;

pub struct WsTransport {
    url: String,
    max_attempts: u32,
    base_delay: std::time::Duration,
}

impl WsTransport {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            url: config.server.ws_url.clone(),
            max_attempts: config.reconnect.max_attempts.max(1),
            base_delay: config.reconnect.delay(),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, ctx: &ConnectContext) -> Result<Box<dyn TransportHandle>> {
        let url = format!("{}?userId={}&token={}", self.url, ctx.user_id, ctx.token);

        let mut attempt = 0u32;
        let stream = loop {
            attempt += 1;
            match connect_async(url.as_str()).await {
                Ok((stream, _response)) => break stream,
                Err(e) if attempt < self.max_attempts => {
                    let jitter = rand::rng().random_range(0..RETRY_JITTER_MS);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        error = %e,
                        "websocket connect failed, retrying"
                    );
                    tokio::time::sleep(self.base_delay + std::time::Duration::from_millis(jitter))
                        .await;
                }
                Err(e) => return Err(SyncError::Connection(e.to_string())),
            }
        };

        let connection_id = Uuid::new_v4();
        info!(%connection_id, attempt, "websocket connected");

        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_BUFFER);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientCommand>(OUTBOUND_BUFFER);
        let cancel = CancellationToken::new();

        let pump_cancel = cancel.clone();
        let (mut sink, mut source) = stream.split();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                    command = outbound_rx.recv() => match command {
                        Some(command) => {
                            let json = match serde_json::to_string(&command) {
                                Ok(json) => json,
                                Err(e) => {
                                    error!(error = %e, "failed to serialize outbound command");
                                    continue;
                                }
                            };
                            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                                let _ = event_tx
                                    .send(TransportEvent::Disconnected {
                                        reason: "send failed".to_string(),
                                    })
                                    .await;
                                break;
                            }
                        }
                        // Handle dropped without close(); the cancel branch
                        // fires via the Drop impl, but bail here regardless.
                        None => break,
                    },
                    frame = source.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                Ok(event) => {
                                    if event_tx.send(TransportEvent::Push(event)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "dropping malformed event frame");
                                }
                            }
                        }
                        // tungstenite answers pings during read/flush
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                        Some(Ok(WsMessage::Close(_))) => {
                            let _ = event_tx
                                .send(TransportEvent::Disconnected {
                                    reason: "server closed the connection".to_string(),
                                })
                                .await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = event_tx
                                .send(TransportEvent::Disconnected { reason: e.to_string() })
                                .await;
                            break;
                        }
                        None => {
                            let _ = event_tx
                                .send(TransportEvent::Disconnected {
                                    reason: "stream ended".to_string(),
                                })
                                .await;
                            break;
                        }
                    }
                }
            }
            debug!(%connection_id, "websocket pump finished");
        });

        Ok(Box::new(WsHandle {
            events: event_rx,
            outbound: outbound_tx,
            cancel,
        }))
    }
}

struct WsHandle {
    events: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<ClientCommand>,
    cancel: CancellationToken,
}

#[async_trait]
impl TransportHandle for WsHandle {
    async fn emit(&mut self, command: ClientCommand) -> Result<()> {
        self.outbound
            .send(command)
            .await
            .map_err(|_| SyncError::NotConnected)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
