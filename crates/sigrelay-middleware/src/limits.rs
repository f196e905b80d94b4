//! Inbound body limits
//!
//! Request bodies are buffered in full before decoding, so both their size
//! and the time a client may take to send them are bounded.

use bytes::Bytes;
use http::{header, HeaderMap};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use sigrelay_core::{Error, Result};
use std::time::Duration;

/// Size and time bounds for reading a request body
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    /// Maximum body size in bytes
    pub max_body_size: usize,
    /// Maximum time to receive the whole body
    pub read_timeout: Duration,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
            read_timeout: Duration::from_secs(15),
        }
    }
}

impl BodyLimits {
    /// Create limits
    pub fn new(max_body_size: usize, read_timeout: Duration) -> Self {
        Self {
            max_body_size,
            read_timeout,
        }
    }

    /// Reject early when the declared length is already over the limit
    pub fn check_declared(&self, headers: &HeaderMap) -> Result<()> {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        match declared {
            Some(len) if len > self.max_body_size as u64 => Err(Error::RequestTooLarge {
                limit: self.max_body_size,
            }),
            _ => Ok(()),
        }
    }

    /// Buffer a body within the limits
    pub async fn read<B>(&self, body: B) -> Result<Bytes>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let limit = self.max_body_size;
        let collected = tokio::time::timeout(self.read_timeout, Limited::new(body, limit).collect())
            .await
            .map_err(|_| {
                tracing::debug!(
                    timeout_ms = %self.read_timeout.as_millis(),
                    "Request body read timed out"
                );
                Error::InvalidRequest("timed out reading request body".to_string())
            })?;

        match collected {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(Error::RequestTooLarge { limit })
            }
            Err(e) => Err(Error::InvalidRequest(format!(
                "Failed to read request body: {e}"
            ))),
        }
    }
}
