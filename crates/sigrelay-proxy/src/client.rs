//! HTTP client for making requests to trust-service upstreams

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use sigrelay_core::{Destination, Error, Result};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Body type alias
pub type Body = Full<Bytes>;

/// A fully buffered outbound call
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Request method
    pub method: Method,
    /// Admitted destination
    pub destination: Destination,
    /// Headers to send, `Host` excluded
    pub headers: HeaderMap,
    /// Raw body bytes
    pub body: Bytes,
}

/// A fully buffered upstream answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    /// Upstream status code
    pub status: StatusCode,
    /// Raw body bytes
    pub body: Bytes,
}

/// Something that can carry an [`UpstreamRequest`] to its destination
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and buffer the complete response
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Bound on the whole exchange, connect through last body byte
    pub request_timeout: Duration,

    /// Largest response body that will be buffered
    pub max_response_size: usize,

    /// Skip upstream certificate chain verification
    pub insecure_skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_response_size: 16 * 1024 * 1024,
            insecure_skip_verify: true,
        }
    }
}

/// HTTP client for upstream requests
///
/// One connection per request: the relay talks to many distinct hosts at
/// low volume, so there is nothing worth pooling.
#[derive(Clone)]
pub struct HttpClient {
    config: ClientConfig,
    tls: TlsConnector,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish()
    }
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let tls = crate::tls::connector(config.insecure_skip_verify)?;
        Ok(Self { config, tls })
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn exchange(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let destination = &request.destination;
        let host = destination.connect_host();
        let port = destination.port();

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .map_err(|_| Error::UpstreamTimeout)?
        .map_err(|e| Error::UpstreamConnection(format!("{}:{}: {}", host, port, e)))?;

        let req = build_request(&request)?;

        if destination.is_https() {
            let server_name = ServerName::try_from(host.clone())
                .map_err(|e| Error::UpstreamTls(format!("invalid server name {host}: {e}")))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| Error::UpstreamTls(e.to_string()))?;
            self.send_on(TokioIo::new(tls_stream), req).await
        } else {
            self.send_on(TokioIo::new(stream), req).await
        }
    }

    async fn send_on<I>(&self, io: I, req: Request<Body>) -> Result<UpstreamResponse>
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| Error::UpstreamConnection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "Upstream connection closed with error");
            }
        });

        let response = sender
            .send_request(req)
            .await
            .map_err(|e| Error::UpstreamConnection(e.to_string()))?;

        let status = response.status();
        let limit = self.config.max_response_size;

        let body = Limited::new(response.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    Error::ResponseTooLarge { limit }
                } else {
                    Error::UpstreamConnection(e.to_string())
                }
            })?
            .to_bytes();

        Ok(UpstreamResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        match tokio::time::timeout(self.config.request_timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamTimeout),
        }
    }
}

/// Origin-form request with `Host` set from the destination
fn build_request(request: &UpstreamRequest) -> Result<Request<Body>> {
    let destination = &request.destination;

    let host = HeaderValue::from_str(&destination.authority())
        .map_err(|e| Error::InvalidRequest(format!("Invalid host: {e}")))?;

    let mut builder = Request::builder()
        .method(request.method.clone())
        .uri(destination.path_and_query())
        .header(header::HOST, host);

    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }

    builder
        .body(Full::new(request.body.clone()))
        .map_err(|e| Error::InvalidRequest(format!("Invalid upstream request: {e}")))
}
