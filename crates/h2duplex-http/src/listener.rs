use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use h2duplex_conn::Conn;
use h2duplex_transport::Lifetime;
use http::{Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::error::{HttpError, Result};
use crate::server::{LocalAddr, RemoteAddr, Server};

type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// TCP listener serving duplex exchanges over HTTP/2.
///
/// Each TCP connection is served by hyper-util's auto builder, so HTTP/2
/// prior-knowledge clients are multiplexed and HTTP/1 clients get a
/// `505 HTTP Version Not Supported` instead of a connection.
#[derive(Debug)]
pub struct DuplexListener {
    listener: TcpListener,
    server: Server,
}

impl DuplexListener {
    /// Bind to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "duplex listener bound");
        Ok(Self {
            listener,
            server: Server::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept requests with `server`'s status and connection config.
    pub fn with_server(mut self, server: Server) -> Self {
        self.server = server;
        self
    }

    /// Serve until the process exits. See [`serve_until`](Self::serve_until).
    pub async fn serve<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(Conn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.serve_until(handler, Lifetime::new()).await
    }

    /// Run `handler` on every accepted connection until `shutdown` ends.
    ///
    /// Every connection's lifetime is a child of `shutdown`, so ending it
    /// also ends the connections still being served.
    pub async fn serve_until<F, Fut>(self, handler: F, shutdown: Lifetime) -> Result<()>
    where
        F: Fn(Conn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let server = Arc::new(self.server);
        let handler = Arc::new(handler);

        loop {
            let (stream, remote) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("duplex listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                },
            };
            debug!(%remote, "accepted TCP connection");

            tokio::spawn(serve_connection(
                stream,
                remote,
                Arc::clone(&server),
                Arc::clone(&handler),
                shutdown.clone(),
            ));
        }
    }
}

async fn serve_connection<F, Fut>(
    stream: TcpStream,
    remote: SocketAddr,
    server: Arc<Server>,
    handler: Arc<F>,
    shutdown: Lifetime,
) where
    F: Fn(Conn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let local = stream.local_addr().ok();

    let service = service_fn(move |mut req: Request<Incoming>| {
        let extensions = req.extensions_mut();
        extensions.insert(RemoteAddr(remote));
        if let Some(local) = local {
            extensions.insert(LocalAddr(local));
        }
        extensions.insert(shutdown.clone());

        let handler = Arc::clone(&handler);
        let response = respond(&server, req, move |conn| (*handler)(conn));
        async move { Ok::<_, Infallible>(response) }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
        debug!(%remote, error = %err, "HTTP connection ended with error");
    }
}

fn respond<F, Fut>(server: &Server, req: Request<Incoming>, handler: F) -> Response<ResponseBody>
where
    F: FnOnce(Conn) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    match server.handle(req, handler) {
        Ok(response) => response.map(|body| body.boxed_unsync()),
        Err(HttpError::DuplexUnsupported { .. }) => status_only(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
        Err(err) => {
            warn!(error = %err, "duplex accept failed");
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn status_only(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Empty::<Bytes>::new().boxed_unsync());
    *response.status_mut() = status;
    response
}
