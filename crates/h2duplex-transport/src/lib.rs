//! Collaborator boundary for h2duplex.
//!
//! A transport that only knows how to run one half-duplex exchange hands
//! the connection core three things:
//! - an inbound byte source ([`Inbound`])
//! - an outbound sink that can be flushed and closed ([`Outbound`])
//! - a cancellable [`Lifetime`] shared by both directions
//!
//! This is the lowest layer of h2duplex. Everything else builds on top of
//! the [`DuplexParts`] type provided here. The [`pipe`] module offers an
//! in-memory transport for tests and embedders.

pub mod error;
pub mod lifetime;
pub mod parts;
pub mod pipe;

pub use error::{Result, TransportError};
pub use lifetime::Lifetime;
pub use parts::{DuplexParts, Inbound, Outbound, PeerInfo};
pub use pipe::{pipe, DEFAULT_PIPE_CAPACITY};
