//! Full-duplex connections over single HTTP/2 exchanges.
//!
//! One HTTP/2 request/response pair carries bytes both ways at once. h2duplex
//! wraps that pair in a symmetric connection with `read`, `write` and
//! `close`, and optionally a line-framed message mode on top.
//!
//! # Crate Structure
//!
//! - [`transport`]: lifetimes and the half-duplex stream pair a connection is built from
//! - [`frame`]: newline-delimited message framing
//! - [`conn`]: the connection core, byte and message modes
//! - [`http`]: HTTP/2 dial and accept adapters (behind the `http` feature)

/// Re-export transport types.
pub mod transport {
    pub use h2duplex_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use h2duplex_frame::*;
}

/// Re-export connection types.
pub mod conn {
    pub use h2duplex_conn::*;
}

/// Re-export HTTP/2 adapter types (requires `http` feature).
#[cfg(feature = "http")]
pub mod http {
    pub use h2duplex_http::*;
}
