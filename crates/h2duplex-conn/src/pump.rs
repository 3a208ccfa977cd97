//! Message-mode pumps.
//!
//! The inbound pump decodes frames from the inbound stream into a bounded
//! receive queue. The outbound pump drains the send queue, encoding each
//! message and writing it under the connection's write guard. Both stop when
//! the lifetime ends; unless the connection was closed locally, the inbound
//! pump first forwards the frames that already arrived.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::{FutureExt, StreamExt};
use h2duplex_frame::{encode_into, FrameConfig, LineCodec};
use h2duplex_transport::{Inbound, Lifetime};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use crate::conn::Shared;
use crate::error::{ConnError, Result};

/// Producer handle onto a connection's send queue.
///
/// Cheap to clone. A successful [`send`](Self::send) means the message was
/// queued, not that it reached the peer; [`flush`](Self::flush) waits for
/// that.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Bytes>,
    lifetime: Lifetime,
    queued: Arc<AtomicU64>,
    written: watch::Receiver<u64>,
}

impl MessageSender {
    pub(crate) fn new(
        tx: mpsc::Sender<Bytes>,
        lifetime: Lifetime,
        written: watch::Receiver<u64>,
    ) -> Self {
        Self {
            tx,
            lifetime,
            queued: Arc::new(AtomicU64::new(0)),
            written,
        }
    }

    /// Queue a message, waiting while the queue is full.
    ///
    /// Fails with [`ConnError::Closed`] once the connection's lifetime has
    /// ended or the outbound pump has stopped.
    pub async fn send(&self, message: impl Into<Bytes>) -> Result<()> {
        let message = message.into();
        if self.lifetime.is_cancelled() {
            return Err(ConnError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => Err(ConnError::Closed),
            result = self.tx.send(message) => {
                result.map_err(|_| ConnError::Closed)?;
                self.queued.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
        }
    }

    /// Wait until every message queued so far has been written and flushed
    /// to the outbound sink.
    ///
    /// Fails with [`ConnError::Closed`] if the lifetime ends or the outbound
    /// pump stops first.
    pub async fn flush(&self) -> Result<()> {
        let target = self.queued.load(Ordering::Acquire);
        let mut written = self.written.clone();
        tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => Err(ConnError::Closed),
            result = written.wait_for(|&count| count >= target) => {
                result.map(|_| ()).map_err(|_| ConnError::Closed)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled() || self.tx.is_closed()
    }
}

pub(crate) async fn inbound(
    source: Inbound,
    config: FrameConfig,
    tx: mpsc::Sender<Result<Bytes>>,
    shared: Arc<Shared>,
) {
    let mut frames = FramedRead::new(source, LineCodec::with_config(&config));

    loop {
        let next = tokio::select! {
            biased;
            _ = shared.lifetime().cancelled() => break,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                trace!(len = message.len(), "inbound message");
                if !forward(&tx, &shared, Ok(message)).await {
                    return;
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "inbound pump stopped");
                forward(&tx, &shared, Err(ConnError::from(err))).await;
                return;
            }
            None => {
                debug!("inbound stream ended");
                return;
            }
        }
    }

    if !shared.closed_locally() {
        drain(&mut frames, &tx).await;
    }
    debug!("inbound pump cancelled");
}

/// Push onto the receive queue. False once the consumer is gone or the
/// connection was closed locally.
async fn forward(tx: &mpsc::Sender<Result<Bytes>>, shared: &Shared, item: Result<Bytes>) -> bool {
    let permit = tokio::select! {
        biased;
        _ = shared.lifetime().cancelled() => None,
        permit = tx.reserve() => match permit {
            Ok(permit) => Some(permit),
            Err(_) => return false,
        },
    };

    match permit {
        Some(permit) => {
            permit.send(item);
            true
        }
        None if shared.closed_locally() => false,
        None => tx.send(item).await.is_ok(),
    }
}

/// Forward the frames that already arrived once the lifetime ended.
///
/// Only waits on the consumer, which goes away with the connection.
async fn drain(frames: &mut FramedRead<Inbound, LineCodec>, tx: &mpsc::Sender<Result<Bytes>>) {
    while let Some(Some(item)) = frames.next().now_or_never() {
        let last = item.is_err();
        if tx.send(item.map_err(ConnError::from)).await.is_err() || last {
            return;
        }
    }
}

pub(crate) async fn outbound(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<Bytes>,
    written: watch::Sender<u64>,
) {
    let mut frame = BytesMut::new();

    loop {
        let message = tokio::select! {
            biased;
            _ = shared.lifetime().cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        frame.clear();
        encode_into(&message, &mut frame);
        trace!(len = message.len(), "outbound message");

        if let Err(err) = shared.write(&frame).await {
            if !err.is_closed() {
                warn!(error = %err, "outbound pump stopped");
            }
            break;
        }
        written.send_modify(|count| *count += 1);
    }

    debug!("outbound pump finished");
}
