use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use h2duplex_conn::{Conn, ConnConfig};
use h2duplex_transport::{DuplexParts, Lifetime, PeerInfo};
use http::{Request, Response, StatusCode, Version};
use http_body::Body;
use tracing::{debug, warn};

use crate::body::{self, DuplexBody, DEFAULT_BODY_CAPACITY};
use crate::error::{HttpError, Result};

/// Request extension carrying the peer's socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Request extension carrying the local socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAddr(pub SocketAddr);

/// Responder adapter: turns an incoming HTTP/2 request into a [`Conn`].
///
/// A [`Lifetime`] request extension, when present, becomes the parent of
/// every accepted connection's lifetime.
#[derive(Debug, Clone)]
pub struct Server {
    status: StatusCode,
    conn: ConnConfig,
    body_capacity: usize,
}

impl Server {
    /// Accept with `200 OK` and a stream-mode connection.
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            conn: ConnConfig::default(),
            body_capacity: DEFAULT_BODY_CAPACITY,
        }
    }

    /// Status sent as soon as a request is accepted.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_conn_config(mut self, config: ConnConfig) -> Self {
        self.conn = config;
        self
    }

    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity.max(1);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Accept a duplex request.
    ///
    /// Returns the connection and the response to hand back to hyper. The
    /// response carries the configured status and streams whatever the
    /// connection writes. Requests below HTTP/2 cannot be streamed in both
    /// directions and fail with [`HttpError::DuplexUnsupported`].
    ///
    /// Hyper dropping the response body (stream finished or reset) ends the
    /// connection's lifetime.
    pub fn accept<B>(&self, req: Request<B>) -> Result<(Conn, Response<DuplexBody>)>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let version = req.version();
        if version < Version::HTTP_2 {
            warn!(?version, uri = %req.uri(), "rejecting duplex request");
            return Err(HttpError::DuplexUnsupported { version });
        }

        let extensions = req.extensions();
        let lifetime = extensions
            .get::<Lifetime>()
            .map(Lifetime::child)
            .unwrap_or_default();
        let info = PeerInfo {
            local: extensions.get::<LocalAddr>().map(|addr| addr.0.to_string()),
            remote: extensions.get::<RemoteAddr>().map(|addr| addr.0.to_string()),
        };
        debug!(method = %req.method(), uri = %req.uri(), remote = ?info.remote, "accepting duplex request");

        let (sink, body) = body::channel(&lifetime, self.body_capacity);
        let body = body.cancel_on_drop(&lifetime);
        let inbound = body::reader(req.into_body());
        let conn = Conn::with_config(
            DuplexParts::new(inbound, sink, lifetime).with_info(info),
            self.conn.clone(),
        );

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        Ok((conn, response))
    }

    /// Accept a request and run `handler` on the connection in its own task.
    ///
    /// The connection's lifetime is cancelled when the handler finishes,
    /// whether or not it closed the connection.
    pub fn handle<B, F, Fut>(&self, req: Request<B>, handler: F) -> Result<Response<DuplexBody>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
        F: FnOnce(Conn) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (conn, response) = self.accept(req)?;
        let guard = conn.lifetime().drop_guard();
        let handler = handler(conn);

        tokio::spawn(async move {
            let _guard = guard;
            handler.await;
            debug!("duplex handler finished");
        });
        Ok(response)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::Empty;

    use super::*;

    fn request(version: Version) -> Request<Empty<Bytes>> {
        Request::builder()
            .method("POST")
            .uri("http://localhost/duplex")
            .version(version)
            .body(Empty::new())
            .expect("request should build")
    }

    #[tokio::test]
    async fn http1_request_is_rejected() {
        let err = Server::new()
            .accept(request(Version::HTTP_11))
            .expect_err("HTTP/1.1 should be rejected");
        assert!(matches!(
            err,
            HttpError::DuplexUnsupported { version } if version == Version::HTTP_11
        ));
    }

    #[tokio::test]
    async fn accept_uses_configured_status_and_addresses() {
        let remote: SocketAddr = "10.0.0.7:4242".parse().expect("addr");
        let mut req = request(Version::HTTP_2);
        req.extensions_mut().insert(RemoteAddr(remote));

        let (conn, response) = Server::new()
            .with_status(StatusCode::ACCEPTED)
            .accept(req)
            .expect("HTTP/2 request should be accepted");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(conn.remote_addr(), Some("10.0.0.7:4242"));
        assert_eq!(conn.local_addr(), None);
    }

    #[tokio::test]
    async fn parent_lifetime_extension_is_inherited() {
        let parent = Lifetime::new();
        let mut req = request(Version::HTTP_2);
        req.extensions_mut().insert(parent.clone());

        let (conn, _response) = Server::new().accept(req).expect("accept");
        parent.cancel();
        assert!(conn.is_done());
    }

    #[tokio::test]
    async fn finished_handler_cancels_lifetime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _response = Server::new()
            .handle(request(Version::HTTP_2), move |conn| async move {
                let _ = tx.send(conn.lifetime().clone());
            })
            .expect("handle should accept");

        let lifetime = rx.await.expect("handler should run");
        tokio::time::timeout(std::time::Duration::from_secs(5), lifetime.cancelled())
            .await
            .expect("lifetime should end with the handler");
    }
}
