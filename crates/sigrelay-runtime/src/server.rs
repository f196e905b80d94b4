//! HTTP server implementation

use crate::handler::RequestHandler;
use crate::shutdown::ShutdownSignal;
use crate::RuntimeState;
use bytes::Bytes;
use http::{header, HeaderValue, Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::{TokioIo, TokioTimer};
use sigrelay_config::{Config, ServerConfig};
use sigrelay_core::{Body, Error, Result};
use sigrelay_proxy::{ClientConfig, HttpClient, Transport};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};

/// HTTP server
pub struct Server {
    config: ServerConfig,
    handler: RequestHandler,
    state: Arc<RwLock<RuntimeState>>,
    shutdown: ShutdownSignal,
    listener: Mutex<Option<TcpListener>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("request_count", &self.handler.request_count())
            .finish()
    }
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Get the current state
    pub async fn state(&self) -> RuntimeState {
        *self.state.read().await
    }

    /// Configured listen address
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen
    }

    /// Get the request handler
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Get request count
    pub fn request_count(&self) -> usize {
        self.handler.request_count()
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Bind the listener and return the bound address
    ///
    /// Port `0` picks a free port. Binding again after a successful bind
    /// returns the existing address.
    pub async fn bind(&self) -> Result<SocketAddr> {
        let mut slot = self.listener.lock().await;
        if let Some(ref listener) = *slot {
            return Ok(listener.local_addr()?);
        }

        let listener = TcpListener::bind(self.listen_addr()).await.map_err(|e| {
            Error::Runtime(format!("Failed to bind to {}: {}", self.listen_addr(), e))
        })?;
        let addr = listener.local_addr()?;
        *slot = Some(listener);
        Ok(addr)
    }

    /// Run the server until the shutdown signal fires
    pub async fn run(&self) -> Result<()> {
        self.bind().await?;
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Runtime("listener already consumed".to_string()))?;
        let local_addr = listener.local_addr()?;

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::Running;
        }

        tracing::info!(
            listen = %local_addr,
            allowlisted_hosts = self.handler.allowlist().len(),
            "Server listening"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        while !self.shutdown.is_triggered() {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::trace!("Accepted connection from {}", addr);

                            let handler = self.handler.clone();
                            let header_timeout = self.config.body_read_timeout;
                            tokio::spawn(async move {
                                let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                                    let handler = handler.clone();
                                    async move {
                                        let response = match handler.handle(req).await {
                                            Ok(response) => response,
                                            Err(e) => {
                                                tracing::error!("Request handler error: {}", e);
                                                fallback_response(&e)
                                            }
                                        };
                                        Ok::<_, Infallible>(response)
                                    }
                                });

                                let io = TokioIo::new(stream);
                                if let Err(e) = hyper::server::conn::http1::Builder::new()
                                    .timer(TokioTimer::new())
                                    .header_read_timeout(header_timeout)
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::debug!("HTTP connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::ShuttingDown;
        }

        let shutdown_timeout = self.config.shutdown_timeout;
        let start = Instant::now();

        tracing::info!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Waiting for in-flight requests to complete"
        );

        loop {
            let active = self.handler.in_flight();

            if active == 0 {
                tracing::info!("All requests completed, shutting down cleanly");
                break;
            }

            if start.elapsed() >= shutdown_timeout {
                tracing::warn!(
                    active_requests = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }

            tracing::debug!(
                active_requests = active,
                elapsed_ms = start.elapsed().as_millis(),
                "Waiting for active requests to complete"
            );

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        {
            let mut state = self.state.write().await;
            *state = RuntimeState::Stopped;
        }

        tracing::info!(
            shutdown_duration_ms = start.elapsed().as_millis(),
            "Server stopped"
        );

        Ok(())
    }
}

/// Response for a handler failure that could not itself be rendered
fn fallback_response(error: &Error) -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::from(error.client_message())));
    *response.status_mut() = error.to_status_code();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Server builder
#[derive(Default)]
pub struct ServerBuilder {
    config: Option<Config>,
    transport: Option<Arc<dyn Transport>>,
    shutdown: Option<ShutdownSignal>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl ServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `transport` for upstream calls instead of the built-in client
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing shutdown signal
    pub fn shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Build the server
    pub fn build(self) -> Result<Server> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("config is required".to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let client = HttpClient::new(ClientConfig {
                    connect_timeout: config.relay.connect_timeout,
                    request_timeout: config.server.request_timeout,
                    max_response_size: config.relay.max_response_size,
                    insecure_skip_verify: config.relay.insecure_skip_verify,
                })?;
                Arc::new(client) as Arc<dyn Transport>
            }
        };

        if config.relay.insecure_skip_verify {
            tracing::warn!(
                "Upstream certificate verification is disabled: destinations are trusted \
                 by allowlisted hostname, not by certificate chain"
            );
        }

        let handler = RequestHandler::from_config(&config, transport)?;

        tracing::info!(
            profile = ?config.relay.profile,
            allowlisted_hosts = handler.allowlist().len(),
            static_dir = ?config.server.static_dir,
            max_body_size = config.server.max_body_size,
            max_response_size = config.relay.max_response_size,
            "Server components initialized"
        );

        Ok(Server {
            config: config.server,
            handler,
            state: Arc::new(RwLock::new(RuntimeState::Initializing)),
            shutdown: self.shutdown.unwrap_or_default(),
            listener: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigrelay_config::ConfigBuilder;

    fn test_config() -> Config {
        ConfigBuilder::new()
            .listen("127.0.0.1:0".parse().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_server_builder() {
        let server = ServerBuilder::new().config(test_config()).build().unwrap();

        assert_eq!(server.listen_addr().port(), 0);
        assert_eq!(server.request_count(), 0);
    }

    #[test]
    fn test_server_builder_no_config() {
        let result = ServerBuilder::new().build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bind_reports_free_port() {
        let server = ServerBuilder::new().config(test_config()).build().unwrap();

        let addr = server.bind().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.bind().await.unwrap(), addr);
        assert_eq!(server.state().await, RuntimeState::Initializing);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let server = Arc::new(ServerBuilder::new().config(test_config()).build().unwrap());
        server.bind().await.unwrap();

        let shutdown = server.shutdown_signal();
        let running = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        while server.state().await != RuntimeState::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.trigger();

        running.await.unwrap().unwrap();
        assert_eq!(server.state().await, RuntimeState::Stopped);
    }

    #[tokio::test]
    async fn test_stalled_headers_close_connection() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut config = test_config();
        config.server.body_read_timeout = Duration::from_millis(200);
        let server = Arc::new(ServerBuilder::new().config(config).build().unwrap());
        let addr = server.bind().await.unwrap();

        let shutdown = server.shutdown_signal();
        let running = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: relay\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
        assert!(closed.is_ok(), "connection with unfinished headers stayed open");
        assert_eq!(server.request_count(), 0);

        shutdown.trigger();
        running.await.unwrap().unwrap();
    }

    #[test]
    fn test_fallback_response() {
        let response = fallback_response(&Error::Internal("boom".to_string()));
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
