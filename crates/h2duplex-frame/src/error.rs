/// Errors that can occur while decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// No delimiter was found within the line buffer capacity.
    #[error("frame too long (no delimiter within {max} bytes)")]
    FrameTooLong { max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
