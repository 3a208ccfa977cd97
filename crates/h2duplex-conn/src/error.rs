use std::io;

use h2duplex_frame::FrameError;
use h2duplex_transport::TransportError;

/// Errors that can occur on an established connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The connection lifetime has ended; the operation cannot proceed.
    #[error("connection closed")]
    Closed,

    /// The underlying stream failed. Never retried.
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    /// The inbound pump could not decode a frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// `send`/`receive` were called on a stream-mode connection.
    #[error("message API unavailable on a stream-mode connection")]
    StreamMode,
}

impl ConnError {
    /// True for errors caused by the connection having been closed.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ConnError::Closed | ConnError::Transport(TransportError::Cancelled)
        )
    }
}

impl From<ConnError> for io::Error {
    fn from(err: ConnError) -> Self {
        match err {
            ConnError::Io(err)
            | ConnError::Frame(FrameError::Io(err))
            | ConnError::Transport(TransportError::Io(err)) => err,
            ConnError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"),
            ConnError::Frame(other) => io::Error::new(io::ErrorKind::InvalidData, other),
            ConnError::Transport(TransportError::DeadlineExceeded) => {
                io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
            }
            ConnError::Transport(other) => io::Error::other(other),
            other @ ConnError::StreamMode => io::Error::new(io::ErrorKind::Unsupported, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;
