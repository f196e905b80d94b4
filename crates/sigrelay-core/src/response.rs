//! Response builder and utilities

use crate::envelope::{self, ENVELOPE_CONTENT_TYPE};
use crate::{Error, Result};
use bytes::Bytes;
use http::{header, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;

/// Body type alias
pub type Body = Full<Bytes>;

/// Response builder for convenient response construction
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseBuilder {
    /// Create a new response builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// Set a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Set several headers
    pub fn headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (HeaderName, HeaderValue)>,
    {
        self.headers.extend(headers);
        self
    }

    /// Disable caching of the response
    pub fn no_store(self) -> Self {
        self.header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
    }

    /// Build response with empty body
    pub fn build(self) -> Result<Response<Body>> {
        self.body(Bytes::new())
    }

    /// Build response with text body
    pub fn text(self, body: impl Into<String>) -> Result<Response<Body>> {
        self.header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )
        .body(Bytes::from(body.into()))
    }

    /// Build response whose body is the base64 envelope of `payload`
    pub fn envelope(self, payload: &[u8]) -> Result<Response<Body>> {
        self.header(
            header::CONTENT_TYPE,
            HeaderValue::from_static(ENVELOPE_CONTENT_TYPE),
        )
        .body(Bytes::from(envelope::encode(payload)))
    }

    /// Build response with raw body bytes
    pub fn body(self, body: Bytes) -> Result<Response<Body>> {
        let mut response = Response::builder().status(self.status);

        for (name, value) in self.headers {
            response = response.header(name, value);
        }

        Ok(response.body(Full::new(body))?)
    }
}

/// Convenience functions for common responses
pub mod responses {
    use super::*;

    /// 200 OK
    pub fn ok() -> ResponseBuilder {
        ResponseBuilder::new(StatusCode::OK)
    }

    /// 404 Not Found
    pub fn not_found() -> Result<Response<Body>> {
        ResponseBuilder::new(StatusCode::NOT_FOUND).text("Not Found")
    }

    /// 405 Method Not Allowed
    pub fn method_not_allowed() -> Result<Response<Body>> {
        ResponseBuilder::new(StatusCode::METHOD_NOT_ALLOWED).text("Method Not Allowed")
    }

    /// Plain-text response describing `error`
    pub fn from_error(error: &Error) -> ResponseBuilder {
        ResponseBuilder::new(error.to_status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_envelope_response() {
        let response = ResponseBuilder::new(StatusCode::OK)
            .no_store()
            .envelope(b"hello")
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            ENVELOPE_CONTENT_TYPE
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"aGVsbG8="));
    }

    #[test]
    fn test_text_response() {
        let response = ResponseBuilder::new(StatusCode::FORBIDDEN)
            .header(
                HeaderName::from_static("x-custom"),
                HeaderValue::from_static("value"),
            )
            .text("Forbidden")
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get("x-custom").unwrap(), "value");
    }

    #[test]
    fn test_response_from_error() {
        let err = Error::InvalidEnvelope("bad".to_string());
        let response = responses::from_error(&err)
            .text(err.client_message())
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
