//! Adapters between HTTP bodies and the byte streams a [`Conn`] consumes.
//!
//! The outbound direction is a bounded channel: [`ChannelSink`] is the
//! `AsyncWrite` end handed to the connection, [`DuplexBody`] is the
//! `http_body::Body` end handed to hyper. The inbound direction wraps the
//! peer's body in a `StreamReader`.
//!
//! [`Conn`]: h2duplex_conn::Conn

use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::TryStreamExt;
use h2duplex_transport::Lifetime;
use http_body::{Body, Frame};
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::{DropGuard, PollSender, WaitForCancellationFutureOwned};
use tracing::debug;

/// Default number of written chunks buffered ahead of hyper.
pub const DEFAULT_BODY_CAPACITY: usize = 16;

/// Outgoing body of a duplex exchange.
///
/// Yields one DATA frame per chunk written to the paired [`ChannelSink`].
/// Ends when the sink is shut down or the lifetime is cancelled; chunks
/// already queued are sent first.
pub struct DuplexBody {
    rx: mpsc::Receiver<Bytes>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    guard: Option<DropGuard>,
}

impl DuplexBody {
    /// Cancel the lifetime when hyper drops this body.
    ///
    /// For a response body that is the end of the stream as far as the
    /// responder can tell, either finished or reset by the peer.
    pub fn cancel_on_drop(mut self, lifetime: &Lifetime) -> Self {
        self.guard = Some(lifetime.drop_guard());
        self
    }
}

impl Body for DuplexBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => return Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        match this.cancelled.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for DuplexBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexBody")
            .field("cancel_on_drop", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

/// `AsyncWrite` end of a [`DuplexBody`].
///
/// Every write is copied into one chunk. Flushing is a no-op since chunks
/// are handed to hyper as soon as they are queued. Shutdown closes the
/// channel, which ends the body and sends `END_STREAM`.
#[derive(Debug)]
pub struct ChannelSink {
    tx: PollSender<Bytes>,
}

impl AsyncWrite for ChannelSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();

        if ready!(this.tx.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(body_closed()));
        }
        this.tx
            .send_item(Bytes::copy_from_slice(buf))
            .map_err(|_| body_closed())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}

fn body_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body closed by peer")
}

/// Create the outbound pair for one exchange.
///
/// Pass the connection's own lifetime, not a parent.
pub fn channel(lifetime: &Lifetime, capacity: usize) -> (ChannelSink, DuplexBody) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sink = ChannelSink {
        tx: PollSender::new(tx),
    };
    let body = DuplexBody {
        rx,
        cancelled: Box::pin(lifetime.cancelled_owned()),
        guard: None,
    };
    (sink, body)
}

/// Adapt an incoming body into a byte stream.
///
/// Trailers are skipped; body errors surface as `io::Error`s.
pub fn reader<B>(body: B) -> impl AsyncRead + Send + 'static
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    StreamReader::new(body.into_data_stream().map_err(io::Error::other))
}

/// Like [`reader`], but ends `lifetime` once the body is exhausted or fails.
///
/// The read that observes the end still returns normally, so every byte the
/// peer sent is delivered before the lifetime ends.
pub fn reader_ending<B>(body: B, lifetime: Lifetime) -> EndingReader<impl AsyncRead + Send + 'static>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    EndingReader {
        inner: Box::pin(reader(body)),
        lifetime,
    }
}

/// Byte stream that reports its own end through a [`Lifetime`].
pub struct EndingReader<R> {
    inner: Pin<Box<R>>,
    lifetime: Lifetime,
}

impl<R: AsyncRead> AsyncRead for EndingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let had_room = buf.remaining() > 0;
        let before = buf.filled().len();

        let result = ready!(this.inner.as_mut().poll_read(cx, buf));
        let ended = match &result {
            Ok(()) => had_room && buf.filled().len() == before,
            Err(_) => true,
        };
        if ended && !this.lifetime.is_cancelled() {
            debug!(failed = result.is_err(), "peer body ended, ending lifetime");
            this.lifetime.cancel();
        }
        Poll::Ready(result)
    }
}

impl<R> fmt::Debug for EndingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndingReader")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
