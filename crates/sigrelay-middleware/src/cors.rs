//! CORS (Cross-Origin Resource Sharing) handling
//!
//! The relay exists for browser callers, so every header set is data: the
//! two historical variants differ only in which headers they emit and on
//! which responses.

use bytes::Bytes;
use http::{header, HeaderName, HeaderValue, Method, Response, StatusCode};
use http_body_util::Full;
use sigrelay_core::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Body type alias
pub type Body = Full<Bytes>;

/// Precomputed CORS headers
#[derive(Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    expose_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
    decorate_errors: bool,
}

impl CorsPolicy {
    /// Build a policy, rejecting values that cannot be sent as headers
    pub fn new<M, H, E>(
        allow_origin: &str,
        allow_methods: M,
        allow_headers: H,
        expose_headers: E,
        max_age: Option<Duration>,
        decorate_errors: bool,
    ) -> Result<Self>
    where
        M: IntoIterator<Item = Method>,
        H: IntoIterator,
        H::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let methods: Vec<String> = allow_methods
            .into_iter()
            .map(|m| m.as_str().to_string())
            .collect();
        let expose = join(expose_headers);

        Ok(Self {
            allow_origin: header_value("allow_origin", allow_origin)?,
            allow_methods: header_value("allow_methods", &methods.join(", "))?,
            allow_headers: header_value("allow_headers", &join(allow_headers))?,
            expose_headers: if expose.is_empty() {
                None
            } else {
                Some(header_value("expose_headers", &expose)?)
            },
            max_age: max_age.map(|age| HeaderValue::from(age.as_secs())),
            decorate_errors,
        })
    }

    /// Wildcard origin; GET, POST and OPTIONS; `Content-Type` allowed
    pub fn permissive() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            allow_methods: HeaderValue::from_static("GET, POST, OPTIONS"),
            allow_headers: HeaderValue::from_static("Content-Type"),
            expose_headers: None,
            max_age: None,
            decorate_errors: true,
        }
    }

    /// Whether rejections and errors also carry CORS headers
    pub fn decorates_errors(&self) -> bool {
        self.decorate_errors
    }

    /// Answer a preflight request
    pub fn preflight(&self) -> Result<Response<Body>> {
        let mut response = Response::builder().status(StatusCode::NO_CONTENT);

        for (name, value) in self.base_headers() {
            response = response.header(name, value);
        }

        if let Some(ref max_age) = self.max_age {
            response = response.header(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }

        Ok(response.body(Full::new(Bytes::new()))?)
    }

    /// Add CORS headers to a response
    pub fn apply(&self, response: &mut Response<Body>) {
        let headers = response.headers_mut();

        for (name, value) in self.base_headers() {
            headers.insert(name, value);
        }

        if let Some(ref expose) = self.expose_headers {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
        }
    }

    fn base_headers(&self) -> [(HeaderName, HeaderValue); 3] {
        [
            (
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                self.allow_origin.clone(),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                self.allow_methods.clone(),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                self.allow_headers.clone(),
            ),
        ]
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl fmt::Debug for CorsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorsPolicy")
            .field("allow_origin", &self.allow_origin)
            .field("allow_methods", &self.allow_methods)
            .field("decorate_errors", &self.decorate_errors)
            .finish()
    }
}

fn join<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Config(format!("Invalid CORS {field}: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_response() {
        let response = CorsPolicy::permissive().preflight().unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET, POST, OPTIONS"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Content-Type"
        );
        assert!(headers.get(header::ACCESS_CONTROL_MAX_AGE).is_none());
    }

    #[test]
    fn test_custom_policy() {
        let policy = CorsPolicy::new(
            "https://app.example.org",
            [Method::GET, Method::POST],
            ["Content-Type", "X-Request-ID"],
            ["X-Upstream-Status"],
            Some(Duration::from_secs(600)),
            false,
        )
        .unwrap();

        let preflight = policy.preflight().unwrap();
        assert_eq!(
            preflight.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(),
            "600"
        );

        let mut response = Response::new(Full::new(Bytes::new()));
        policy.apply(&mut response);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.org"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
                .unwrap(),
            "Content-Type, X-Request-ID"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
                .unwrap(),
            "X-Upstream-Status"
        );
        assert!(!policy.decorates_errors());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let result = CorsPolicy::new(
            "bad\norigin",
            [Method::GET],
            ["Content-Type"],
            Vec::<String>::new(),
            None,
            true,
        );
        assert!(result.is_err());
    }
}
