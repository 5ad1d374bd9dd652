/// Error types for the pairchat server.
/// Matchmaking itself is infallible; these cover client frames and startup.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write PID file {path:?}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    /// True when another server already listens on the requested address
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, ServerError::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}
