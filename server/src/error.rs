//! Error taxonomy for the server
//!
//! Per-connection failures are expressed as a [`DisconnectReason`] and only
//! ever tear down that one connection. [`ServerError`] is reserved for
//! conditions that stop the whole server.

use shared::FrameError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The listening socket itself failed; accepting cannot continue
    #[error("listener failed: {0}")]
    Listener(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a connection is being dropped
#[derive(Debug, Error)]
pub enum DisconnectReason {
    #[error("connection closed by peer")]
    Closed,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] FrameError),
}

impl DisconnectReason {
    /// Orderly closes are routine; everything else is worth a warning
    pub fn is_error(&self) -> bool {
        !matches!(self, DisconnectReason::Closed)
    }
}
