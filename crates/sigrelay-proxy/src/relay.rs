//! Relay executor
//!
//! Labels the outbound request from the destination path, sends it over the
//! [`Transport`], and turns whatever comes back into a 200 base64 envelope.
//! The upstream status is never the caller's HTTP status; when configured it
//! is reported in a separate header instead.

use crate::client::{Body, Transport, UpstreamRequest};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode};
use sigrelay_core::{ContentTypeTable, Destination, Error, ResponseBuilder, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `User-Agent` sent upstream
    pub user_agent: HeaderValue,

    /// Outbound content-type table
    pub content_types: ContentTypeTable,

    /// Header reporting the upstream status to the caller
    pub status_header: Option<HeaderName>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            user_agent: HeaderValue::from_static("signature.proxy"),
            content_types: ContentTypeTable::standard(),
            status_header: None,
        }
    }
}

/// Performs relay calls for admitted destinations
#[derive(Clone)]
pub struct RelayExecutor {
    transport: Arc<dyn Transport>,
    config: ExecutorConfig,
}

impl fmt::Debug for RelayExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayExecutor")
            .field("config", &self.config)
            .finish()
    }
}

impl RelayExecutor {
    /// Create a new executor
    pub fn new(transport: Arc<dyn Transport>, config: ExecutorConfig) -> Self {
        Self { transport, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Outbound content type for a destination; empty means omitted
    pub fn content_type_for(&self, destination: &Destination) -> &str {
        self.config.content_types.resolve(destination.path())
    }

    /// Headers for the outbound request
    fn outbound_headers(&self, destination: &Destination, body_len: usize) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, self.config.user_agent.clone());

        let content_type = self.content_type_for(destination);
        if !content_type.is_empty() {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| Error::Internal(format!("Invalid content type: {e}")))?;
            headers.insert(header::CONTENT_TYPE, value);
        }

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));

        Ok(headers)
    }

    /// Relay `body` to `destination` and wrap the answer in an envelope
    pub async fn relay(
        &self,
        method: Method,
        destination: &Destination,
        body: Bytes,
    ) -> Result<Response<Body>> {
        if method != Method::GET && method != Method::POST {
            return Err(Error::MethodNotAllowed(method));
        }

        let start = Instant::now();
        let request = UpstreamRequest {
            headers: self.outbound_headers(destination, body.len())?,
            method: method.clone(),
            destination: destination.clone(),
            body,
        };

        debug!(
            method = %method,
            destination = %destination,
            body_len = request.body.len(),
            content_type = self.content_type_for(destination),
            "Relaying request"
        );

        let upstream = match self.transport.send(request).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(
                    method = %method,
                    host = destination.host(),
                    error = %e,
                    latency_ms = %start.elapsed().as_millis(),
                    "Upstream call failed"
                );
                return Err(e);
            }
        };

        info!(
            method = %method,
            host = destination.host(),
            path = destination.path(),
            upstream_status = upstream.status.as_u16(),
            response_len = upstream.body.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Relay completed"
        );

        let mut builder = ResponseBuilder::new(StatusCode::OK).no_store();
        if let Some(ref name) = self.config.status_header {
            builder = builder.header(name.clone(), HeaderValue::from(upstream.status.as_u16()));
        }
        builder.envelope(&upstream.body)
    }
}
