use std::net::SocketAddr;

/// Failures surfaced by the synchronization core.
///
/// None of these are fatal to the process: the worst outcome is that a peer
/// or the whole session goes offline while local drawing keeps working.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Payload length is not a whole number of encoded points.
    #[error("malformed stroke payload: {len} bytes is not a multiple of 8")]
    MalformedPayload { len: usize },

    /// Every dial attempt to the host failed.
    #[error("could not reach {url} after {attempts} attempts: {reason}")]
    ConnectionUnavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// A read or write against an established connection failed.
    #[error("{peer} disconnected")]
    PeerDisconnected { peer: String },

    /// The host could not bind its listening socket.
    #[error("failed to listen on {addr}")]
    ListenBindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
