//! Line-delimited message framing for h2duplex connections.
//!
//! Every message travels as one line:
//! - `\n` bytes inside the payload are replaced by a space
//! - a single `\n` terminates the frame
//!
//! The scheme is deliberately lossy for payloads containing `\n`. It keeps
//! framing to a "read one line" primitive on the inbound stream.

pub mod codec;
pub mod error;

pub use codec::{
    decode, encode, encode_into, FrameConfig, LineCodec, DEFAULT_MAX_FRAME_LENGTH, DELIMITER,
    REPLACEMENT,
};
pub use error::{FrameError, Result};
