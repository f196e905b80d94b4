//! Error types for the relay

use crate::allowlist::Rejection;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the relay
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid inbound request
    #[error("Invalid HTTP request: {0}")]
    InvalidRequest(String),

    /// Method is not eligible for relaying
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(http::Method),

    /// Destination failed admission control
    #[error("Destination rejected: {0}")]
    DestinationRejected(Rejection),

    /// Inbound body is not a valid base64 envelope
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Inbound body exceeded the configured limit
    #[error("Request body exceeds {limit} bytes")]
    RequestTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// Upstream connection error
    #[error("Failed to connect to upstream: {0}")]
    UpstreamConnection(String),

    /// Upstream TLS handshake error
    #[error("TLS handshake with upstream failed: {0}")]
    UpstreamTls(String),

    /// Upstream timeout
    #[error("Upstream request timed out")]
    UpstreamTimeout,

    /// Upstream body exceeded the buffering limit
    #[error("Upstream response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    ///
    /// Upstream failures map to 500 rather than 502: callers of the relay
    /// distinguish "relay could not reach the service" from "service said no"
    /// only through the 200 envelope.
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::InvalidRequest(_)
            | Error::MethodNotAllowed(_)
            | Error::InvalidEnvelope(_) => StatusCode::BAD_REQUEST,
            Error::DestinationRejected(_) => StatusCode::FORBIDDEN,
            Error::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ResponseTooLarge { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamConnection(_) | Error::UpstreamTls(_) | Error::UpstreamTimeout => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text written to the caller for this error
    pub fn client_message(&self) -> String {
        match self {
            Error::DestinationRejected(_) => "Forbidden: Invalid or unknown address".to_string(),
            Error::MethodNotAllowed(method) => {
                format!("Bad Request: method {method} cannot be relayed")
            }
            Error::InvalidEnvelope(_) => "Bad Request: body is not valid base64".to_string(),
            Error::InvalidRequest(msg) => format!("Bad Request: {msg}"),
            Error::RequestTooLarge { limit } => {
                format!("Payload Too Large: request body exceeds {limit} bytes")
            }
            Error::UpstreamConnection(_)
            | Error::UpstreamTls(_)
            | Error::UpstreamTimeout
            | Error::ResponseTooLarge { .. } => format!("Proxy error: {self}"),
            other => format!("Error: {other}"),
        }
    }

    /// Whether the error originated on the upstream side of the relay
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::UpstreamConnection(_)
                | Error::UpstreamTls(_)
                | Error::UpstreamTimeout
                | Error::ResponseTooLarge { .. }
        )
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Error::DestinationRejected(rejection)
    }
}
