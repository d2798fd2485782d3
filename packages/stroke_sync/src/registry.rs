//! Host-side set of connected peers.
//!
//! Each peer is represented by the sending half of its outbox; a dedicated
//! writer task per connection drains the outbox onto the socket. Forwarding
//! therefore never awaits network I/O while the registry lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Identifier of one accepted connection.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

pub(crate) type Outbox = mpsc::Sender<Bytes>;

#[derive(Debug, Default)]
pub(crate) struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, Outbox>>,
    next_id: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, outbox: Outbox) -> PeerId {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(id, outbox);
        debug!(peer = %id, "registered peer");
        id
    }

    /// Drop a peer. Dropping its outbox ends the peer's writer task.
    pub fn remove(&self, id: PeerId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(peer = %id, "removed peer");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: PeerId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Queue `payload` for every peer except `from`.
    ///
    /// A peer whose outbox is closed (its connection is gone) is removed on
    /// the spot and not retried. A peer whose outbox is full only misses this
    /// payload: every message is a full snapshot, so the next one supersedes
    /// it. Returns how many peers accepted the payload.
    pub fn broadcast_except(&self, from: PeerId, payload: &Bytes) -> usize {
        let mut peers = self.lock();
        let mut delivered = 0;

        peers.retain(|&id, outbox| {
            if id == from {
                return true;
            }
            match outbox.try_send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(peer = %id, "outbox full, dropping stroke update");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(peer = %id, "forward failed, removing peer");
                    false
                }
            }
        });

        delivered
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, Outbox>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
