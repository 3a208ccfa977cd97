//! In-memory transport.
//!
//! Two cross-wired half-duplex pairs, one per side, each with its own
//! lifetime. Shutting down one side's outbound half makes the other side's
//! inbound half report end-of-stream, which is what an HTTP/2 `END_STREAM`
//! looks like from the core's point of view.

use tracing::debug;

use crate::lifetime::Lifetime;
use crate::parts::{DuplexParts, PeerInfo};

/// Default in-flight byte budget of a pipe direction.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Create a connected pair of in-memory exchanges.
///
/// `capacity` bounds the bytes buffered per direction; a writer blocks once
/// the peer has that many unread bytes.
pub fn pipe(capacity: usize) -> (DuplexParts, DuplexParts) {
    let (left, right) = tokio::io::duplex(capacity);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);

    debug!(capacity, "created in-memory pipe");

    let left = DuplexParts::new(left_read, left_write, Lifetime::new()).with_info(PeerInfo::new(
        "pipe:left".to_string(),
        "pipe:right".to_string(),
    ));
    let right = DuplexParts::new(right_read, right_write, Lifetime::new()).with_info(
        PeerInfo::new("pipe:right".to_string(), "pipe:left".to_string()),
    );
    (left, right)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn bytes_cross_between_sides() {
        let (mut left, mut right) = pipe(DEFAULT_PIPE_CAPACITY);

        left.outbound.write_all(b"hello").await.unwrap();
        left.outbound.flush().await.unwrap();

        let mut buf = [0u8; 5];
        right.inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        right.outbound.write_all(b"back").await.unwrap();
        let mut buf = [0u8; 4];
        left.inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"back");
    }

    #[tokio::test]
    async fn shutdown_is_end_of_stream_for_peer_only() {
        let (mut left, mut right) = pipe(DEFAULT_PIPE_CAPACITY);

        left.outbound.shutdown().await.unwrap();

        let mut buf = [0u8; 8];
        let n = right.inbound.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // The other direction is still open.
        right.outbound.write_all(b"still").await.unwrap();
        let mut buf = [0u8; 5];
        left.inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still");
    }

    #[tokio::test]
    async fn sides_have_independent_lifetimes_and_info() {
        let (left, right) = pipe(16);
        left.lifetime.cancel();
        assert!(!right.lifetime.is_cancelled());
        assert_eq!(left.info.remote.as_deref(), Some("pipe:right"));
        assert_eq!(right.info.local.as_deref(), Some("pipe:right"));
    }
}
