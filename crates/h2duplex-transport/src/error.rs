/// Errors reported by the collaborator boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The lifetime was cancelled, locally or by the transport.
    #[error("lifetime cancelled")]
    Cancelled,

    /// The lifetime reached its deadline.
    #[error("lifetime deadline exceeded")]
    DeadlineExceeded,

    /// An I/O error occurred on one of the half-duplex streams.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
