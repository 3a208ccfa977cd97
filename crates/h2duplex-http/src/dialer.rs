use h2duplex_conn::{Conn, ConnConfig};
use h2duplex_transport::{DuplexParts, Lifetime, PeerInfo};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{response, Method, Request, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, info};

use crate::body::{self, DuplexBody, DEFAULT_BODY_CAPACITY};
use crate::error::{HttpError, Result};

/// HTTP client the dialer sends requests through.
pub type HttpClient = Client<HttpConnector, DuplexBody>;

/// Build a cleartext HTTP/2 (prior knowledge) client.
pub fn http2_client() -> HttpClient {
    Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build_http()
}

/// Initiator adapter: opens a duplex exchange and wraps it in a [`Conn`].
///
/// Construct one per configuration; there is no shared default instance.
#[derive(Debug, Clone)]
pub struct Dialer {
    method: Method,
    headers: HeaderMap,
    conn: ConnConfig,
    body_capacity: usize,
    client: HttpClient,
}

impl Dialer {
    /// `POST` over a fresh HTTP/2 prior-knowledge client.
    pub fn new() -> Self {
        Self {
            method: Method::POST,
            headers: HeaderMap::new(),
            conn: ConnConfig::default(),
            body_capacity: DEFAULT_BODY_CAPACITY,
            client: http2_client(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header sent with every request. Repeated names are appended.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_conn_config(mut self, config: ConnConfig) -> Self {
        self.conn = config;
        self
    }

    /// Chunks buffered between connection writes and the request body.
    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity.max(1);
        self
    }

    /// Send requests through a caller-supplied client.
    ///
    /// The client must negotiate HTTP/2; responses on older protocols are
    /// rejected with [`HttpError::DuplexUnsupported`].
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = client;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Open a duplex connection to `url`.
    ///
    /// Returns once the response head arrives. The connection's lifetime is
    /// a child of `lifetime`: cancelling `lifetime` ends the connection,
    /// closing the connection leaves `lifetime` alone. The connection also
    /// ends once the response body has been read to its end. The status
    /// code is not checked; inspect the returned head.
    pub async fn connect(&self, lifetime: &Lifetime, url: &str) -> Result<(Conn, response::Parts)> {
        lifetime.check()?;
        let parent = lifetime;
        let lifetime = parent.child();

        let (sink, body) = body::channel(&lifetime, self.body_capacity);
        let mut builder = Request::builder().method(self.method.clone()).uri(url);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        let request = builder.body(body)?;
        let remote = request.uri().authority().map(|authority| authority.to_string());

        debug!(method = %self.method, url, "dialing duplex exchange");
        let response = tokio::select! {
            biased;
            _ = parent.cancelled() => return Err(ended(parent)),
            response = self.client.request(request) => response?,
        };

        let version = response.version();
        if version < Version::HTTP_2 {
            return Err(HttpError::DuplexUnsupported { version });
        }

        let (head, incoming) = response.into_parts();
        let inbound = body::reader_ending(incoming, lifetime.clone());
        let parts = DuplexParts::new(inbound, sink, lifetime).with_info(PeerInfo {
            local: None,
            remote,
        });
        let conn = Conn::with_config(parts, self.conn.clone());

        info!(status = %head.status, remote = ?conn.remote_addr(), "duplex connection established");
        Ok((conn, head))
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a dial was cut short by its lifetime.
fn ended(lifetime: &Lifetime) -> HttpError {
    match lifetime.check() {
        Err(err) => err.into(),
        Ok(()) => HttpError::Cancelled,
    }
}

/// Dial `url` with a default [`Dialer`].
pub async fn dial(lifetime: &Lifetime, url: &str) -> Result<(Conn, response::Parts)> {
    Dialer::new().connect(lifetime, url).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::header::CONTENT_TYPE;

    use super::*;

    #[test]
    fn defaults_to_post_without_headers() {
        let dialer = Dialer::new();
        assert_eq!(dialer.method(), Method::POST);
        assert!(dialer.headers().is_empty());
    }

    #[test]
    fn builder_overrides_method_and_headers() {
        let dialer = Dialer::new()
            .with_method(Method::PUT)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("a"),
            )
            .with_header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("b"),
            );

        assert_eq!(dialer.method(), Method::PUT);
        assert_eq!(dialer.headers().get_all("x-trace").iter().count(), 2);
    }

    #[tokio::test]
    async fn cancelled_lifetime_never_dials() {
        let lifetime = Lifetime::new();
        lifetime.cancel();

        let err = dial(&lifetime, "http://127.0.0.1:9/")
            .await
            .expect_err("cancelled dial should fail");
        assert!(matches!(err, HttpError::Cancelled));
    }

    #[tokio::test]
    async fn expired_deadline_is_reported() {
        let lifetime = Lifetime::with_timeout(Duration::ZERO);

        let err = dial(&lifetime, "http://127.0.0.1:9/")
            .await
            .expect_err("expired dial should fail");
        assert!(matches!(err, HttpError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn malformed_url_is_invalid_request() {
        let err = dial(&Lifetime::new(), "http://exa mple.com/")
            .await
            .expect_err("malformed url should fail");
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }
}
