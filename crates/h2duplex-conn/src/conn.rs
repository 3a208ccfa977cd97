use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures_util::FutureExt;
use h2duplex_transport::{DuplexParts, Inbound, Lifetime, Outbound, PeerInfo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use crate::config::{ConnConfig, ConnMode};
use crate::error::{ConnError, Result};
use crate::pump::{self, MessageSender};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a connection. There is no way back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Reads and writes are accepted.
    Open,
    /// The lifetime is cancelled and the outbound sink is being closed.
    Closing,
    /// The outbound sink's close has returned. Terminal.
    Closed,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            OPEN => ConnState::Open,
            CLOSING => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

/// State shared between the connection handle and its background tasks.
pub(crate) struct Shared {
    // Write guard: one writer at a time, never held by readers.
    writer: Mutex<Outbound>,
    lifetime: Lifetime,
    state: AtomicU8,
    // Set by `close()` and drop. A lifetime that ended any other way still
    // hands out inbound data that already arrived.
    closed_locally: AtomicBool,
    flush_after_write: bool,
}

impl Shared {
    pub(crate) fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub(crate) fn closed_locally(&self) -> bool {
        self.closed_locally.load(Ordering::Acquire)
    }

    fn mark_closed_locally(&self) {
        self.closed_locally.store(true, Ordering::Release);
    }

    /// Write all of `buf` under the write guard, then flush.
    pub(crate) async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.lifetime.is_cancelled() {
            return Err(ConnError::Closed);
        }

        let mut writer = tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => return Err(ConnError::Closed),
            writer = self.writer.lock() => writer,
        };

        tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => Err(ConnError::Closed),
            result = write_through(&mut writer, buf, self.flush_after_write) => {
                result.map(|()| buf.len()).map_err(ConnError::Io)
            }
        }
    }

    /// Claim the `Open -> Closing` transition. Only one caller wins.
    fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Close the outbound sink. The state is `Closed` afterwards whatever
    /// the sink reports.
    async fn finish_close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let result = writer.shutdown().await;
        self.state.store(CLOSED, Ordering::Release);

        match &result {
            Ok(()) => debug!("outbound sink closed"),
            Err(err) => warn!(error = %err, "closing outbound sink failed"),
        }
        result.map_err(ConnError::Io)
    }
}

/// Inbound bytes that are ready without waiting, read after the lifetime
/// ended. End of stream once nothing is buffered.
fn read_buffered(inbound: &mut Inbound, buf: &mut [u8]) -> Result<usize> {
    match inbound.read(buf).now_or_never() {
        Some(Ok(n)) => Ok(n),
        Some(Err(err)) => {
            debug!(error = %err, "inbound failed after lifetime ended");
            Ok(0)
        }
        None => Ok(0),
    }
}

async fn write_through(sink: &mut Outbound, buf: &[u8], flush: bool) -> io::Result<()> {
    sink.write_all(buf).await?;
    if flush {
        sink.flush().await?;
    }
    Ok(())
}

/// Closes the sink when the lifetime ends without an explicit `close()`.
async fn watch_lifetime(shared: Arc<Shared>) {
    shared.lifetime.cancelled().await;
    if shared.begin_close() {
        debug!("lifetime ended, closing outbound sink");
        // finish_close logs its own failure; nobody is waiting for it here.
        let _ = shared.finish_close().await;
    }
}

enum Inbox {
    Stream(Mutex<Inbound>),
    Messages(Mutex<MessageInbox>),
}

/// Receiving end of the inbound pump.
struct MessageInbox {
    rx: mpsc::Receiver<Result<Bytes>>,
    // Remainder of a message partially consumed by `read`.
    pending: Bytes,
    finished: bool,
}

impl MessageInbox {
    fn new(rx: mpsc::Receiver<Result<Bytes>>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
            finished: false,
        }
    }

    async fn next(&mut self) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => {
                self.finished = true;
                Err(err)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

/// Symmetric full-duplex connection.
///
/// Built by an adapter from the [`DuplexParts`] of one half-duplex exchange.
/// Reads and writes take `&self`: share the connection behind an `Arc` to
/// read and write from different tasks. At most one read and one write are
/// in flight at any time, and the two directions never wait on each other.
///
/// Dropping the connection cancels its lifetime.
pub struct Conn {
    shared: Arc<Shared>,
    // Read guard lives inside the inbox.
    inbox: Inbox,
    outbox: Option<MessageSender>,
    info: PeerInfo,
    mode: ConnMode,
}

impl Conn {
    /// Create a stream-mode connection with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(parts: DuplexParts) -> Self {
        Self::with_config(parts, ConnConfig::default())
    }

    /// Create a connection with explicit configuration.
    ///
    /// The connection takes ownership of `parts.lifetime` and cancels it on
    /// close; hand it a [`Lifetime::child`] to keep the parent independent.
    /// Must be called from within a tokio runtime.
    pub fn with_config(parts: DuplexParts, config: ConnConfig) -> Self {
        let DuplexParts {
            inbound,
            outbound,
            lifetime,
            info,
        } = parts;

        let shared = Arc::new(Shared {
            writer: Mutex::new(outbound),
            lifetime,
            state: AtomicU8::new(OPEN),
            closed_locally: AtomicBool::new(false),
            flush_after_write: config.flush_after_write,
        });
        tokio::spawn(watch_lifetime(Arc::clone(&shared)));

        let (inbox, outbox) = match config.mode {
            ConnMode::Stream => (Inbox::Stream(Mutex::new(inbound)), None),
            ConnMode::Messages => {
                let capacity = config.queue_capacity.max(1);
                let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
                let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
                let (written_tx, written_rx) = watch::channel(0);

                tokio::spawn(pump::inbound(
                    inbound,
                    config.frame.clone(),
                    inbound_tx,
                    Arc::clone(&shared),
                ));
                tokio::spawn(pump::outbound(Arc::clone(&shared), outbound_rx, written_tx));

                (
                    Inbox::Messages(Mutex::new(MessageInbox::new(inbound_rx))),
                    Some(MessageSender::new(
                        outbound_tx,
                        shared.lifetime.clone(),
                        written_rx,
                    )),
                )
            }
        };

        debug!(mode = ?config.mode, remote = ?info.remote, "connection open");

        Self {
            shared,
            inbox,
            outbox,
            info,
            mode: config.mode,
        }
    }

    /// Read into `buf`. `Ok(0)` means end of stream.
    ///
    /// In stream mode this forwards to the inbound stream. In message mode
    /// it copies the next decoded message, keeping any remainder for the
    /// following call; empty messages are skipped.
    ///
    /// After [`close`](Self::close) every read returns end of stream. When
    /// the lifetime ends some other way (parent cancelled, transport
    /// finished) reads stop waiting for the peer but still return what has
    /// already arrived: buffered bytes in stream mode, queued messages in
    /// message mode.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.shared.closed_locally() {
            return Ok(0);
        }
        let lifetime = &self.shared.lifetime;

        match &self.inbox {
            Inbox::Stream(inbound) => {
                let mut inbound = inbound.lock().await;
                if lifetime.is_cancelled() {
                    return self.read_after_end(&mut inbound, buf);
                }
                tokio::select! {
                    biased;
                    _ = lifetime.cancelled() => {}
                    result = inbound.read(buf) => return result.map_err(ConnError::Io),
                }
                self.read_after_end(&mut inbound, buf)
            }
            Inbox::Messages(inbox) => {
                let mut inbox = inbox.lock().await;
                while inbox.pending.is_empty() {
                    match inbox.next().await? {
                        Some(message) => inbox.pending = message,
                        None => return Ok(0),
                    }
                }
                let n = buf.len().min(inbox.pending.len());
                buf[..n].copy_from_slice(&inbox.pending[..n]);
                inbox.pending.advance(n);
                Ok(n)
            }
        }
    }

    fn read_after_end(&self, inbound: &mut Inbound, buf: &mut [u8]) -> Result<usize> {
        if self.shared.closed_locally() {
            return Ok(0);
        }
        read_buffered(inbound, buf)
    }

    /// Read exactly `buf.len()` bytes.
    ///
    /// Fails with `UnexpectedEof` if the stream ends first.
    pub async fn read_exact(&self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.read(buf).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            let (_, rest) = std::mem::take(&mut buf).split_at_mut(n);
            buf = rest;
        }
        Ok(())
    }

    /// Write all of `buf` and flush it to the peer.
    ///
    /// Returns `buf.len()` on success. Sink errors are returned unchanged;
    /// writes after the lifetime ended fail with [`ConnError::Closed`].
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.shared.write(buf).await
    }

    /// Queue a message for the outbound pump (message mode only).
    pub async fn send(&self, message: impl Into<Bytes>) -> Result<()> {
        self.outbox
            .as_ref()
            .ok_or(ConnError::StreamMode)?
            .send(message)
            .await
    }

    /// Wait until every message this connection queued has reached the
    /// outbound sink (message mode only).
    ///
    /// Call before [`close`](Self::close) when queued messages must not be
    /// dropped.
    pub async fn flush(&self) -> Result<()> {
        self.outbox
            .as_ref()
            .ok_or(ConnError::StreamMode)?
            .flush()
            .await
    }

    /// Producer handle onto the send queue (message mode only).
    pub fn sender(&self) -> Result<MessageSender> {
        self.outbox.clone().ok_or(ConnError::StreamMode)
    }

    /// Next message from the inbound pump (message mode only).
    ///
    /// `Ok(None)` once the inbound stream ended and queued messages are
    /// drained. If the pump stopped on an error, that error is returned
    /// once before `Ok(None)`.
    pub async fn receive(&self) -> Result<Option<Bytes>> {
        let Inbox::Messages(inbox) = &self.inbox else {
            return Err(ConnError::StreamMode);
        };
        let mut inbox = inbox.lock().await;
        if !inbox.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut inbox.pending)));
        }
        inbox.next().await
    }

    /// Close the connection.
    ///
    /// Cancels the lifetime first, which unblocks every pending read and
    /// write, then closes the outbound sink. The caller that performs the
    /// close gets the sink's error; later calls return `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        self.shared.mark_closed_locally();
        if !self.shared.begin_close() {
            return Ok(());
        }
        debug!(remote = ?self.info.remote, "closing connection");
        self.shared.lifetime.cancel();
        self.shared.finish_close().await
    }

    /// Wait until the connection's lifetime ends.
    pub async fn done(&self) {
        self.shared.lifetime.cancelled().await
    }

    /// True once the lifetime has ended.
    pub fn is_done(&self) -> bool {
        self.shared.lifetime.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        match self.shared.state.load(Ordering::Acquire) {
            OPEN if self.shared.lifetime.is_cancelled() => ConnState::Closing,
            value => ConnState::from_u8(value),
        }
    }

    /// The connection's lifetime. Clone it to wait for `done` elsewhere.
    pub fn lifetime(&self) -> &Lifetime {
        &self.shared.lifetime
    }

    /// Endpoint addresses reported by the transport.
    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    /// Local address, if known.
    pub fn local_addr(&self) -> Option<&str> {
        self.info.local.as_deref()
    }

    /// Remote address, if known.
    pub fn remote_addr(&self) -> Option<&str> {
        self.info.remote.as_deref()
    }

    pub fn mode(&self) -> ConnMode {
        self.mode
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.shared.mark_closed_locally();
        self.shared.lifetime.cancel();
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("info", &self.info)
            .finish()
    }
}
