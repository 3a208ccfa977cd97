use std::fmt;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::lifetime::Lifetime;

/// Inbound half of an exchange: the bytes the peer streams to us.
pub type Inbound = Pin<Box<dyn AsyncRead + Send>>;

/// Outbound half of an exchange.
///
/// `poll_flush` makes written bytes visible to the peer, `poll_shutdown`
/// signals end-of-exchange and is called at most once by the core.
pub type Outbound = Pin<Box<dyn AsyncWrite + Send>>;

/// Descriptive addresses of the two endpoints, when the transport knows them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub local: Option<String>,
    pub remote: Option<String>,
}

impl PeerInfo {
    pub fn new(local: impl Into<Option<String>>, remote: impl Into<Option<String>>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// Everything a transport hands over once a half-duplex exchange is live.
pub struct DuplexParts {
    pub inbound: Inbound,
    pub outbound: Outbound,
    pub lifetime: Lifetime,
    pub info: PeerInfo,
}

impl DuplexParts {
    /// Bundle an inbound source, an outbound sink and their shared lifetime.
    pub fn new<R, W>(inbound: R, outbound: W, lifetime: Lifetime) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self {
            inbound: Box::pin(inbound),
            outbound: Box::pin(outbound),
            lifetime,
            info: PeerInfo::default(),
        }
    }

    /// Attach endpoint addresses.
    pub fn with_info(mut self, info: PeerInfo) -> Self {
        self.info = info;
        self
    }
}

impl fmt::Debug for DuplexParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexParts")
            .field("lifetime", &self.lifetime)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
