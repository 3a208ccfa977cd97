use std::fmt;
use std::io;

use h2duplex_conn::ConnError;
use h2duplex_frame::FrameError;
use h2duplex_http::HttpError;
use h2duplex_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::DeadlineExceeded => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLong { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    match err {
        ConnError::Io(source) => io_error(context, source),
        ConnError::Frame(err) => frame_error(context, err),
        ConnError::Transport(err) => transport_error(context, err),
        ConnError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        ConnError::StreamMode => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn http_error(context: &str, err: HttpError) -> CliError {
    match err {
        HttpError::Io(source) => io_error(context, source),
        HttpError::Conn(err) => conn_error(context, err),
        HttpError::InvalidRequest(_) => CliError::new(USAGE, format!("{context}: {err}")),
        HttpError::Request(_) | HttpError::DuplexUnsupported { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        HttpError::DeadlineExceeded => CliError::new(TIMEOUT, format!("{context}: {err}")),
        HttpError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_too_long_is_invalid_data() {
        let err = conn_error("receive failed", ConnError::Frame(FrameError::FrameTooLong { max: 4096 }));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("receive failed: "));
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = io_error("connect failed", io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn denied_bind_is_permission_denied() {
        let err = io_error("bind failed", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn dial_deadline_is_timeout() {
        assert_eq!(http_error("connect failed", HttpError::DeadlineExceeded).code, TIMEOUT);
        assert_eq!(
            http_error(
                "connect failed",
                HttpError::DuplexUnsupported {
                    version: http::Version::HTTP_11
                }
            )
            .code,
            TRANSPORT_ERROR
        );
    }
}
