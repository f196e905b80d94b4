//! HTTP request handler
//!
//! The only externally reachable entry point. Each request goes through, in
//! order: CORS preflight, the static fallback when no `address` is given, the
//! method gate, destination admission, body decoding, and finally the relay.
//! Nothing touches the network before the destination has been admitted.

use crate::static_files::StaticFiles;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request, Response};
use sigrelay_config::Config;
use sigrelay_core::envelope;
use sigrelay_core::response::responses;
use sigrelay_core::{Allowlist, Body, Error, Result};
use sigrelay_middleware::{BodyLimits, CorsPolicy};
use sigrelay_proxy::{ExecutorConfig, RelayExecutor, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Query parameter naming the relay destination
pub const ADDRESS_PARAM: &str = "address";

/// HTTP request handler
#[derive(Debug, Clone)]
pub struct RequestHandler {
    allowlist: Arc<Allowlist>,
    executor: RelayExecutor,
    cors: CorsPolicy,
    limits: BodyLimits,
    static_files: StaticFiles,
    request_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when the request finishes
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RequestHandler {
    /// Create a new request handler
    pub fn new(
        allowlist: Allowlist,
        executor: RelayExecutor,
        cors: CorsPolicy,
        limits: BodyLimits,
        static_files: StaticFiles,
    ) -> Self {
        Self {
            allowlist: Arc::new(allowlist),
            executor,
            cors,
            limits,
            static_files,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wire a handler from configuration over the given transport
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let relay = &config.relay;

        let user_agent = HeaderValue::from_str(&relay.user_agent)
            .map_err(|e| Error::Config(format!("Invalid user_agent: {e}")))?;
        let status_header = relay
            .status_header()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    Error::Config(format!("Invalid upstream_status_header {name:?}: {e}"))
                })
            })
            .transpose()?;

        let executor = RelayExecutor::new(
            transport,
            ExecutorConfig {
                user_agent,
                content_types: relay.content_table(),
                status_header,
            },
        );

        let cors_config = config.effective_cors();
        let methods = cors_config
            .allow_methods
            .iter()
            .map(|m| {
                m.parse::<Method>()
                    .map_err(|_| Error::Config(format!("Invalid CORS method: {m}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let cors = CorsPolicy::new(
            &cors_config.allow_origin,
            methods,
            &cors_config.allow_headers,
            &cors_config.expose_headers,
            cors_config.max_age,
            cors_config.decorate_errors,
        )?;

        let limits = BodyLimits::new(config.server.max_body_size, config.server.body_read_timeout);

        Ok(Self::new(
            relay.allowlist(),
            executor,
            cors,
            limits,
            StaticFiles::new(config.server.static_dir.clone()),
        ))
    }

    /// Total requests handled
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Requests currently being handled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get the allowlist
    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Handle an incoming HTTP request
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Body>>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let _in_flight = InFlight::enter(&self.in_flight);

        let start = Instant::now();
        let method = req.method().clone();

        if method == Method::OPTIONS {
            debug!(path = %req.uri().path(), "Answering CORS preflight");
            return self.cors.preflight();
        }

        let address = match address_param(req.uri().query()) {
            Some(address) => address,
            None => {
                debug!(method = %method, path = %req.uri().path(), "No address, static fallback");
                let mut response = self
                    .static_files
                    .serve(&method, req.uri().path())
                    .await?;
                self.decorate(&mut response);
                return Ok(response);
            }
        };

        match self.relay(req, &address).await {
            Ok(mut response) => {
                self.cors.apply(&mut response);
                Ok(response)
            }
            Err(e) => {
                if e.is_upstream() {
                    error!(
                        method = %method,
                        error = %e,
                        latency_ms = %start.elapsed().as_millis(),
                        "Proxy error"
                    );
                } else {
                    debug!(method = %method, error = %e, "Request refused");
                }
                self.error_response(&e)
            }
        }
    }

    /// Gates, decoding and the relay call for a request carrying an address
    async fn relay<B>(&self, req: Request<B>, address: &str) -> Result<Response<Body>>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        if method != Method::GET && method != Method::POST {
            return Err(Error::MethodNotAllowed(method));
        }

        let destination = self.allowlist.admit(address).map_err(|reason| {
            warn!(
                method = %method,
                reason = %reason,
                address_len = address.len(),
                "Destination rejected"
            );
            Error::from(reason)
        })?;

        let body = if method == Method::POST {
            self.limits.check_declared(req.headers())?;
            let text = self.limits.read(req.into_body()).await?;
            Bytes::from(envelope::decode(&text)?)
        } else {
            Bytes::new()
        };

        debug!(
            method = %method,
            host = destination.host(),
            body_len = body.len(),
            "Destination admitted"
        );

        self.executor.relay(method, &destination, body).await
    }

    fn error_response(&self, error: &Error) -> Result<Response<Body>> {
        let mut response = responses::from_error(error).text(error.client_message())?;
        self.decorate(&mut response);
        Ok(response)
    }

    /// CORS headers on responses other than preflight and relay success
    fn decorate(&self, response: &mut Response<Body>) {
        if self.cors.decorates_errors() {
            self.cors.apply(response);
        }
    }
}

/// First `address` query parameter, form-decoded; empty counts as missing
fn address_param(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == ADDRESS_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::{header, StatusCode};
    use http_body_util::{BodyExt, Full};
    use sigrelay_proxy::{UpstreamRequest, UpstreamResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<UpstreamRequest>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
            self.calls.lock().unwrap().push(request);
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                body: Bytes::from_static(b"ok"),
            })
        }
    }

    fn handler(config: &Config) -> (RequestHandler, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let handler = RequestHandler::from_config(config, recorder.clone()).unwrap();
        (handler, recorder)
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[test]
    fn test_address_param() {
        assert_eq!(address_param(None), None);
        assert_eq!(address_param(Some("")), None);
        assert_eq!(address_param(Some("address=")), None);
        assert_eq!(
            address_param(Some("address=https%3A%2F%2Fca.gov.ua%2Ftsp&address=x")),
            Some("https://ca.gov.ua/tsp".to_string())
        );
        assert_eq!(
            address_param(Some("other=1&address=http://czo.gov.ua/ocsp")),
            Some("http://czo.gov.ua/ocsp".to_string())
        );
    }

    #[tokio::test]
    async fn test_method_gate_precedes_admission() {
        let (handler, recorder) = handler(&Config::default());

        let response = handler
            .handle(request(
                Method::PUT,
                "/?address=https://evil.example.com/",
                "",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_post_rejected() {
        let mut config = Config::default();
        config.server.max_body_size = 8;
        let (handler, recorder) = handler(&config);

        let response = handler
            .handle(request(
                Method::POST,
                "/?address=https://ca.gov.ua/tsp",
                "AAAAAAAAAAAAAAAA",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_profile_leaves_errors_bare() {
        let mut config = Config::default();
        config.relay.profile = sigrelay_config::RelayProfile::Legacy;
        let (handler, _) = handler(&config);

        let rejected = handler
            .handle(request(Method::GET, "/?address=https://evil.example.com/", ""))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
        assert!(rejected
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());

        let relayed = handler
            .handle(request(Method::GET, "/?address=https://ca.gov.ua/ocsp", ""))
            .await
            .unwrap();
        assert_eq!(relayed.status(), StatusCode::OK);
        assert_eq!(
            relayed
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert!(relayed.headers().get("x-upstream-status").is_none());
    }

    #[tokio::test]
    async fn test_status_header_is_exposed_to_browsers() {
        let mut renamed = Config::default();
        renamed.relay.upstream_status_header = "X-Relay-Status".to_string();

        let mut legacy = Config::default();
        legacy.relay.profile = sigrelay_config::RelayProfile::Legacy;
        legacy.relay.expose_upstream_status = Some(true);

        for (config, name) in [(renamed, "x-relay-status"), (legacy, "x-upstream-status")] {
            let (handler, _) = handler(&config);
            let response = handler
                .handle(request(Method::GET, "/?address=https://ca.gov.ua/tsp", ""))
                .await
                .unwrap();

            assert_eq!(response.headers().get(name).unwrap(), "200");
            let exposed = response
                .headers()
                .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
                .unwrap()
                .to_str()
                .unwrap()
                .to_ascii_lowercase();
            assert_eq!(exposed, name);
        }
    }

    #[tokio::test]
    async fn test_counters() {
        let (handler, _) = handler(&Config::default());

        let response = handler
            .handle(request(Method::GET, "/?address=https://ca.gov.ua/", ""))
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        assert_eq!(body, Bytes::from_static(b"b2s="));
        assert_eq!(handler.request_count(), 1);
        assert_eq!(handler.in_flight(), 0);
    }
}
