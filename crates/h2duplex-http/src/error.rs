use std::io;

use h2duplex_conn::ConnError;
use h2duplex_transport::TransportError;

/// Errors that can occur while establishing or serving a duplex exchange.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request could not be constructed (bad URL, method or header).
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// The HTTP client failed to complete the exchange.
    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// The caller's lifetime was cancelled before the connection was ready.
    #[error("cancelled before the connection was established")]
    Cancelled,

    /// The caller's deadline passed before the connection was ready.
    #[error("deadline exceeded before the connection was established")]
    DeadlineExceeded,

    /// The negotiated protocol cannot stream both directions at once.
    #[error("HTTP/2 duplex streaming not supported (negotiated {version:?})")]
    DuplexUnsupported { version: http::Version },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection error: {0}")]
    Conn(#[from] ConnError),
}

impl From<TransportError> for HttpError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => HttpError::Cancelled,
            TransportError::DeadlineExceeded => HttpError::DeadlineExceeded,
            TransportError::Io(err) => HttpError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;
