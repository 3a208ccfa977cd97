//! Symmetric full-duplex connection over one half-duplex exchange.
//!
//! A [`Conn`] owns the inbound stream and outbound sink an adapter produced
//! from a single HTTP/2 request/response pair (or any other transport that
//! yields [`DuplexParts`](h2duplex_transport::DuplexParts)):
//!
//! - `read` consumes the inbound stream, serialized by a read guard
//! - `write` writes and flushes the outbound sink, serialized by a write guard
//! - `close` cancels the connection lifetime and closes the sink exactly once
//!
//! In message mode two background pumps move line-framed messages through
//! bounded queues; see [`ConnConfig::messages`].

pub mod config;
pub mod conn;
pub mod error;
pub mod pump;

pub use config::{ConnConfig, ConnMode};
pub use conn::{Conn, ConnState};
pub use error::{ConnError, Result};
pub use pump::MessageSender;
