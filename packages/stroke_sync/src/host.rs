//! Room host: accepts peers on `ws://<bind>/ws` and relays stroke updates.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start()──► Listening ──shutdown()──► Stopped
//! ```
//!
//! Each accepted connection runs as two tasks: a reader that decodes inbound
//! payloads, replaces the host's own drawing and relays the raw bytes to the
//! other peers, and a writer that drains the peer's outbox onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::codec;
use crate::drawing::SharedDrawing;
use crate::error::SyncError;
use crate::registry::{PeerId, PeerRegistry};
use crate::{DEFAULT_PORT, WS_PATH};

#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Address the room listens on.
    pub bind_addr: SocketAddr,
    /// How long in-flight connections get to close on shutdown before the
    /// listener is torn down regardless.
    pub shutdown_grace: Duration,
    /// Relayed updates queued per peer before further ones are dropped.
    pub outbox_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            shutdown_grace: Duration::from_secs(1),
            outbox_capacity: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostState {
    Stopped,
    Listening,
}

/// State shared by every connection of one running room.
struct RelayHub {
    drawing: SharedDrawing,
    peers: PeerRegistry,
    shutdown: CancellationToken,
    outbox_capacity: usize,
}

impl RelayHub {
    fn new(drawing: SharedDrawing, outbox_capacity: usize) -> Self {
        Self {
            drawing,
            peers: PeerRegistry::new(),
            shutdown: CancellationToken::new(),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Apply one inbound payload from `from`.
    ///
    /// The payload is relayed exactly as received, never re-encoded from the
    /// decoded points. Returns the number of peers it was queued for.
    fn accept_payload(&self, from: PeerId, payload: Bytes) -> Result<usize, SyncError> {
        let points = codec::decode(&payload)?;
        debug!(peer = %from, points = points.len(), "stroke update");
        self.drawing.replace(points);
        Ok(self.peers.broadcast_except(from, &payload))
    }
}

struct Running {
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    server: JoinHandle<std::io::Result<()>>,
}

/// The hosting side of a room.
///
/// Owns the peer registry; nothing outside the host can reach it.
pub struct SessionHost {
    config: HostConfig,
    drawing: SharedDrawing,
    running: Option<Running>,
}

impl SessionHost {
    pub fn new(drawing: SharedDrawing, config: HostConfig) -> Self {
        Self {
            config,
            drawing,
            running: None,
        }
    }

    pub fn state(&self) -> HostState {
        if self.running.is_some() {
            HostState::Listening
        } else {
            HostState::Stopped
        }
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.hub.peers.len())
    }

    /// Open the room. Calling this while already listening is a no-op that
    /// returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, SyncError> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let bind_addr = self.config.bind_addr;
        let bind_failure = |source| SyncError::ListenBindFailure {
            addr: bind_addr,
            source,
        };
        let listener = TcpListener::bind(bind_addr).await.map_err(bind_failure)?;
        let addr = listener.local_addr().map_err(bind_failure)?;

        let hub = Arc::new(RelayHub::new(
            self.drawing.clone(),
            self.config.outbox_capacity,
        ));
        let app = router(hub.clone());
        let shutdown = hub.shutdown.clone();

        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        });

        info!(%addr, "room listening on ws://{}{}", addr, WS_PATH);
        self.running = Some(Running { addr, hub, server });
        Ok(addr)
    }

    /// Close the room, giving connections the configured grace period.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        info!(addr = %running.addr, "closing room");
        running.hub.shutdown.cancel();
        running.hub.peers.clear();

        let mut server = running.server;
        match tokio::time::timeout(self.config.shutdown_grace, &mut server).await {
            Ok(Ok(Ok(()))) => info!("room closed"),
            Ok(Ok(Err(e))) => warn!("room server exited with error: {}", e),
            Ok(Err(e)) => warn!("room server task failed: {}", e),
            Err(_) => {
                warn!(
                    "connections still open after {:?}, closing listener",
                    self.config.shutdown_grace
                );
                server.abort();
            }
        }
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.hub.shutdown.cancel();
            running.server.abort();
        }
    }
}

fn router(hub: Arc<RelayHub>) -> Router {
    Router::new()
        .route(WS_PATH, get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn websocket_handler(
    State(hub): State<Arc<RelayHub>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_peer(socket, addr, hub))
}

async fn handle_peer(socket: WebSocket, addr: SocketAddr, hub: Arc<RelayHub>) {
    let (sender, mut receiver) = socket.split();
    let (outbox, outbox_rx) = mpsc::channel::<Bytes>(hub.outbox_capacity);
    let id = hub.peers.register(outbox);
    info!(peer = %id, %addr, "peer joined");

    // Cancelled by room shutdown or by either half of this connection failing.
    let peer_cancel = hub.shutdown.child_token();
    tokio::spawn(forward_outbox(
        sender,
        outbox_rx,
        id,
        hub.clone(),
        peer_cancel.clone(),
    ));

    loop {
        let msg = tokio::select! {
            _ = peer_cancel.cancelled() => break,
            msg = receiver.next() => msg,
        };

        match msg {
            Some(Ok(Message::Binary(payload))) => {
                if let Err(e) = hub.accept_payload(id, payload) {
                    warn!(peer = %id, "discarding message: {}", e);
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                info!(peer = %id, "peer left");
                break;
            }
            Some(Ok(Message::Text(_))) => {
                debug!(peer = %id, "ignoring text message");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(peer = %id, "read failed: {}", e);
                break;
            }
        }
    }

    peer_cancel.cancel();
    hub.peers.remove(id);
}

/// Writer half of a peer connection: drains the outbox onto the socket.
///
/// Ends when the registry drops this peer's outbox or the peer is cancelled.
/// A failed write removes the peer at once and cancels its reader.
async fn forward_outbox<S>(
    mut sink: S,
    mut outbox: mpsc::Receiver<Bytes>,
    id: PeerId,
    hub: Arc<RelayHub>,
    peer_cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        let payload = tokio::select! {
            _ = peer_cancel.cancelled() => break,
            payload = outbox.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };
        if let Err(e) = sink.send(Message::Binary(payload)).await {
            warn!(peer = %id, "forward failed, removing peer: {}", e);
            hub.peers.remove(id);
            peer_cancel.cancel();
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;

    fn loopback_config() -> HostConfig {
        HostConfig {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            ..Default::default()
        }
    }

    #[test]
    fn default_config_listens_on_all_interfaces_port_8000() {
        let config = HostConfig::default();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
    }

    #[test]
    fn accepted_payload_replaces_drawing_and_relays_raw_bytes() {
        let drawing = SharedDrawing::new();
        drawing.append(&[Point::new(1.0, 1.0); 5]);
        let hub = RelayHub::new(drawing.clone(), 4);

        let (from_tx, _from_rx) = mpsc::channel(4);
        let (other_tx, mut other_rx) = mpsc::channel(4);
        let from = hub.peers.register(from_tx);
        hub.peers.register(other_tx);

        let stroke = [
            Point::new(1.0, 2.0),
            Point::new(3.0, 4.0),
            Point::new(5.0, 6.0),
        ];
        let payload = Bytes::from(codec::encode(&stroke));
        assert_eq!(hub.accept_payload(from, payload.clone()).unwrap(), 1);
        assert_eq!(drawing.snapshot(), stroke);
        assert_eq!(other_rx.try_recv().unwrap(), payload);
    }

    #[test]
    fn lone_peer_update_is_applied_without_relay() {
        let drawing = SharedDrawing::new();
        let hub = RelayHub::new(drawing.clone(), 4);
        let (tx, mut rx) = mpsc::channel(4);
        let from = hub.peers.register(tx);

        let payload = Bytes::from(codec::encode(&[Point::new(7.0, 7.0); 3]));
        assert_eq!(payload.len(), 24);
        assert_eq!(hub.accept_payload(from, payload).unwrap(), 0);
        assert_eq!(drawing.len(), 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_payload_is_dropped_and_peer_kept() {
        let drawing = SharedDrawing::new();
        drawing.append(&[Point::new(1.0, 1.0)]);
        let hub = RelayHub::new(drawing.clone(), 4);
        let (tx, _rx) = mpsc::channel(4);
        let from = hub.peers.register(tx);

        let err = hub
            .accept_payload(from, Bytes::from_static(&[0u8; 9]))
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload { len: 9 }));
        assert_eq!(drawing.len(), 1);
        assert_eq!(hub.peers.len(), 1);
    }

    #[tokio::test]
    async fn start_and_shutdown_transitions() {
        let mut host = SessionHost::new(SharedDrawing::new(), loopback_config());
        assert_eq!(host.state(), HostState::Stopped);

        let addr = host.start().await.unwrap();
        assert_eq!(host.state(), HostState::Listening);
        assert_eq!(host.local_addr(), Some(addr));
        assert_ne!(addr.port(), 0);

        // A second start is a no-op.
        assert_eq!(host.start().await.unwrap(), addr);

        host.shutdown().await;
        assert_eq!(host.state(), HostState::Stopped);
        assert_eq!(host.peer_count(), 0);

        // The port is free again.
        let relisten = TcpListener::bind(addr).await;
        assert!(relisten.is_ok());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let mut host = SessionHost::new(
            SharedDrawing::new(),
            HostConfig {
                bind_addr: addr,
                ..Default::default()
            },
        );
        match host.start().await {
            Err(SyncError::ListenBindFailure { addr: a, .. }) => assert_eq!(a, addr),
            other => panic!("expected ListenBindFailure, got {other:?}"),
        }
        assert_eq!(host.state(), HostState::Stopped);
    }

    #[tokio::test]
    async fn failed_write_removes_peer_and_stops_its_reader() {
        let hub = Arc::new(RelayHub::new(SharedDrawing::new(), 4));
        let (tx, rx) = mpsc::channel(4);
        let broken = hub.peers.register(tx.clone());
        let (other_tx, _other_rx) = mpsc::channel(4);
        hub.peers.register(other_tx);
        assert_eq!(hub.peers.len(), 2);

        let broken_socket = Box::pin(futures_util::sink::unfold(
            (),
            |(), _msg: Message| async {
                Err::<(), _>(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection reset",
                ))
            },
        ));
        tx.send(Bytes::from_static(b"12345678")).await.unwrap();
        drop(tx);

        let peer_cancel = hub.shutdown.child_token();
        tokio::time::timeout(
            Duration::from_secs(5),
            forward_outbox(broken_socket, rx, broken, hub.clone(), peer_cancel.clone()),
        )
        .await
        .unwrap();

        // Gone without waiting for another relay to notice.
        assert_eq!(hub.peers.len(), 1);
        assert!(!hub.peers.contains(broken));
        assert!(peer_cancel.is_cancelled());
        assert!(!hub.shutdown.is_cancelled());
    }
}
