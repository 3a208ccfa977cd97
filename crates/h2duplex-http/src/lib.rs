//! HTTP/2 adapters for h2duplex.
//!
//! One HTTP/2 request/response pair is a full-duplex byte channel: the
//! request body flows client to server, the response body flows back, and
//! both stay open as long as neither side ends its stream. This crate turns
//! such an exchange into a [`Conn`](h2duplex_conn::Conn) on either end:
//!
//! - [`Dialer`] (initiator) sends a request with a streaming body and wraps
//!   the response
//! - [`Server`] (responder) accepts a request inside a hyper service and
//!   returns the streaming response
//! - [`DuplexListener`] runs the TCP accept loop around a [`Server`]
//!
//! HTTP/1 cannot flush a response while the request body is still being
//! read, so both adapters refuse it with [`HttpError::DuplexUnsupported`].

pub mod body;
pub mod dialer;
pub mod error;
pub mod listener;
pub mod server;

pub use body::{ChannelSink, DuplexBody, DEFAULT_BODY_CAPACITY};
pub use dialer::{dial, http2_client, Dialer, HttpClient};
pub use error::{HttpError, Result};
pub use listener::DuplexListener;
pub use server::{LocalAddr, RemoteAddr, Server};
