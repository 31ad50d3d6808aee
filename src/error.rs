//! Unified error type.

use std::net::SocketAddr;
use std::time::Duration;

/// The error type returned by tally's fallible lifecycle operations.
///
/// Per-request failures (404, 500, 504, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures only: binding the listener and tearing it down.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listener could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Connections were still open when the grace period ran out.
    /// They have been aborted by the time this is returned.
    #[error("shutdown grace period of {grace:?} elapsed with {in_flight} connection(s) still open")]
    ShutdownTimeout { grace: Duration, in_flight: usize },

    /// The accept loop task ended abnormally.
    #[error("accept loop terminated: {0}")]
    Join(#[from] tokio::task::JoinError),
}
