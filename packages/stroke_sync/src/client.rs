//! Joining side of a room: dial the host, mirror its updates, push ours.
//!
//! # Lifecycle
//!
//! ```text
//! 1. PeerClient::new(drawing, config)
//! 2. client.connect().await      ← up to `connect_attempts` dials
//!       ├─ Ok(label)   host address for display, receive loop running
//!       └─ Err(ConnectionUnavailable)   stays offline, drawing still works
//! 3. client.send_current_state() ← once per frame while drawing
//! 4. client.disconnect()
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::{debug, info, warn};

use crate::codec;
use crate::drawing::SharedDrawing;
use crate::error::SyncError;
use crate::{DEFAULT_PORT, WS_PATH};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Host name or IP of the room.
    pub host: String,
    pub port: u16,
    /// Dials before giving up.
    pub connect_attempts: u32,
    /// Pause between failed dials.
    pub retry_delay: Duration,
    /// Bound on a single dial, so an unroutable host cannot stall the join.
    pub connect_timeout: Duration,
    /// Outbound snapshots queued before frames are skipped.
    pub outbox_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_attempts: 3,
            retry_delay: Duration::from_millis(300),
            connect_timeout: Duration::from_secs(2),
            outbox_capacity: 8,
        }
    }
}

impl ClientConfig {
    pub fn ws_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("ws://[{}]:{}{}", self.host, self.port, WS_PATH)
        } else {
            format!("ws://{}:{}{}", self.host, self.port, WS_PATH)
        }
    }
}

/// An established connection to the host.
struct Link {
    host_label: String,
    outbox: mpsc::Sender<Bytes>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

// Dropping the outbox lets the writer flush and send a close frame; the
// reader would otherwise wait on the host indefinitely.
impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct PeerClient {
    drawing: SharedDrawing,
    config: ClientConfig,
    link: Option<Link>,
}

impl PeerClient {
    pub fn new(drawing: SharedDrawing, config: ClientConfig) -> Self {
        Self {
            drawing,
            config,
            link: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether the receive loop is still running against a live connection.
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.connected.load(Ordering::Acquire))
    }

    /// Remote address of the host as recorded at connect time.
    pub fn host_label(&self) -> Option<&str> {
        self.link
            .as_ref()
            .filter(|link| link.connected.load(Ordering::Acquire))
            .map(|link| link.host_label.as_str())
    }

    /// Dial the configured host, retrying a bounded number of times.
    ///
    /// On success the receive loop is running and the host's address label is
    /// returned. On failure the client is left with no connection.
    pub async fn connect(&mut self) -> Result<&str, SyncError> {
        self.disconnect();

        let url = self.config.ws_url();
        let ws = dial(&url, &self.config).await?;
        let host_label = remote_label(&ws).unwrap_or_else(|| self.config.ws_url());
        info!(host = %host_label, "connected to room");

        let (sink, stream) = ws.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (outbox, outbox_rx) = mpsc::channel(self.config.outbox_capacity.max(1));

        let reader = tokio::spawn(receive_loop(
            stream,
            self.drawing.clone(),
            connected.clone(),
        ));
        tokio::spawn(send_loop(sink, outbox_rx, connected.clone()));

        let link = self.link.insert(Link {
            host_label,
            outbox,
            connected,
            reader,
        });
        Ok(link.host_label.as_str())
    }

    /// Push a snapshot of the local drawing to the host.
    ///
    /// Without a live connection this does nothing, so drawing keeps working
    /// offline. The write itself happens on the writer task; a failed write
    /// takes the link offline.
    pub fn send_current_state(&self) -> Result<(), SyncError> {
        let Some(link) = self.link.as_ref() else {
            return Ok(());
        };
        if !link.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        let payload = Bytes::from(codec::encode(&self.drawing.snapshot()));
        match link.outbox.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!("outbox full, skipping frame");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SyncError::PeerDisconnected {
                peer: link.host_label.clone(),
            }),
        }
    }

    /// Drop the connection, if any.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.connected.store(false, Ordering::Release);
            info!(host = %link.host_label, "left room");
        }
    }
}

async fn dial(url: &str, config: &ClientConfig) -> Result<WsStream, SyncError> {
    let attempts = config.connect_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(url))
            .await
        {
            Ok(Ok((ws, _response))) => {
                debug!(attempt, "dial succeeded");
                return Ok(ws);
            }
            Ok(Err(e)) => {
                warn!(attempt, attempts, "failed to connect to {}: {}", url, e);
                last_error = describe_dial_error(&e);
            }
            Err(_) => {
                warn!(attempt, attempts, "timed out connecting to {}", url);
                last_error = format!("timed out after {:?}", config.connect_timeout);
            }
        }

        if attempt < attempts {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    Err(SyncError::ConnectionUnavailable {
        url: url.to_string(),
        attempts,
        reason: last_error,
    })
}

fn describe_dial_error(err: &tungstenite::Error) -> String {
    match err {
        tungstenite::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::ConnectionRefused => "connection refused".to_string(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                "connection dropped during handshake".to_string()
            }
            _ => io.to_string(),
        },
        tungstenite::Error::Http(response) => {
            format!("host answered HTTP {}", response.status())
        }
        other => other.to_string(),
    }
}

fn remote_label(ws: &WsStream) -> Option<String> {
    match ws.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok().map(|addr| addr.to_string()),
        _ => None,
    }
}

async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    drawing: SharedDrawing,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(tungstenite::Message::Binary(payload)) => match codec::decode(&payload) {
                Ok(points) => {
                    debug!(points = points.len(), "remote stroke update");
                    drawing.replace(points);
                }
                Err(e) => warn!("discarding message: {}", e),
            },
            Ok(tungstenite::Message::Close(_)) => {
                info!("host closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("failed to read from host: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::Release);
    info!("disconnected from room");
}

/// Writes queued snapshots to the host.
///
/// The first failed write ends the loop: the socket is gone, and every queued
/// snapshot is stale once a newer one is drawn. The link is then offline, so
/// later frames are not queued at all.
async fn send_loop<S>(
    mut sink: S,
    mut outbox: mpsc::Receiver<Bytes>,
    connected: Arc<AtomicBool>,
) where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(payload) = outbox.recv().await {
        if let Err(e) = sink.send(tungstenite::Message::Binary(payload)).await {
            warn!(
                queued = outbox.len(),
                "failed to send stroke update, going offline: {}", e
            );
            connected.store(false, Ordering::Release);
            break;
        }
    }
    let _ = sink.close().await;
}
