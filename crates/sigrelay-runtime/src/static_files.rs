//! Static-asset fallback
//!
//! Requests that name no destination are page or asset loads. They are
//! answered from an optional directory; without one the answer is an empty
//! 200, the way the relay has always behaved.

use bytes::Bytes;
use http::{header, HeaderValue, Method, Response};
use sigrelay_core::response::responses;
use sigrelay_core::{Body, Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const INDEX_FILE: &str = "index.html";

/// Extension to content type
const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("ico", "image/x-icon"),
    ("wasm", "application/wasm"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

const DEFAULT_MIME: &str = "application/octet-stream";

/// Serves files below an optional root directory
#[derive(Debug, Clone, Default)]
pub struct StaticFiles {
    root: Option<PathBuf>,
}

impl StaticFiles {
    /// Serve from `root`, or answer empty when `None`
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Answer a request for `path`
    pub async fn serve(&self, method: &Method, path: &str) -> Result<Response<Body>> {
        if method != Method::GET && method != Method::HEAD {
            let mut response = responses::method_not_allowed()?;
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return Ok(response);
        }

        let root = match self.root {
            Some(ref root) => root,
            None => return responses::ok().build(),
        };

        let relative = match relative_path(path) {
            Some(relative) => relative,
            None => {
                debug!(path = %path, "Refusing static path");
                return responses::not_found();
            }
        };

        let file = root.join(relative);
        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return responses::not_found(),
            Err(e) if e.kind() == ErrorKind::NotFound => return responses::not_found(),
            Err(e) => return Err(Error::Io(e)),
        }

        let contents = match tokio::fs::read(&file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return responses::not_found(),
            Err(e) => return Err(Error::Io(e)),
        };

        debug!(file = %file.display(), len = contents.len(), "Serving static file");

        let builder = responses::ok()
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static(mime_for(&file)),
            )
            .header(header::CONTENT_LENGTH, HeaderValue::from(contents.len()));

        if method == Method::HEAD {
            builder.build()
        } else {
            builder.body(Bytes::from(contents))
        }
    }
}

/// Relative file path for a request path; `None` when it must not be served
fn relative_path(path: &str) -> Option<PathBuf> {
    if path.contains('\\') || path.contains('\0') {
        return None;
    }

    let mut relative = PathBuf::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return None;
        }
        relative.push(segment);
    }

    if path.is_empty() || path.ends_with('/') {
        relative.push(INDEX_FILE);
    }

    Some(relative)
}

fn mime_for(file: &Path) -> &'static str {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    ext.and_then(|ext| {
        MIME_TYPES
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, mime)| *mime)
    })
    .unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::BodyExt;

    async fn body_of(response: Response<Body>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("/"), Some(PathBuf::from("index.html")));
        assert_eq!(
            relative_path("/app/main.js"),
            Some(PathBuf::from("app/main.js"))
        );
        assert_eq!(
            relative_path("/docs/"),
            Some(PathBuf::from("docs/index.html"))
        );
        assert_eq!(relative_path("/../etc/passwd"), None);
        assert_eq!(relative_path("/a/./b"), None);
        assert_eq!(relative_path("/a\\b"), None);
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("index.HTML")), "text/html; charset=utf-8");
        assert_eq!(mime_for(Path::new("app.wasm")), "application/wasm");
        assert_eq!(mime_for(Path::new("blob")), DEFAULT_MIME);
    }

    #[tokio::test]
    async fn test_without_root_answers_empty() {
        let files = StaticFiles::default();
        let response = files.serve(&Method::GET, "/anything").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_other_methods_rejected() {
        let files = StaticFiles::default();
        let response = files.serve(&Method::DELETE, "/").await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, HEAD");
    }

    #[tokio::test]
    async fn test_serves_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>relay</h1>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "console.log(1)").unwrap();

        let files = StaticFiles::new(Some(dir.path().to_path_buf()));

        let index = files.serve(&Method::GET, "/").await.unwrap();
        assert_eq!(index.status(), StatusCode::OK);
        assert_eq!(
            index.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        assert_eq!(body_of(index).await, Bytes::from_static(b"<h1>relay</h1>"));

        let head = files.serve(&Method::HEAD, "/js/app.js").await.unwrap();
        assert_eq!(head.headers().get(header::CONTENT_LENGTH).unwrap(), "14");
        assert!(body_of(head).await.is_empty());

        let missing = files.serve(&Method::GET, "/nope.css").await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let directory = files.serve(&Method::GET, "/js").await.unwrap();
        assert_eq!(directory.status(), StatusCode::NOT_FOUND);

        let escape = files.serve(&Method::GET, "/../secret").await.unwrap();
        assert_eq!(escape.status(), StatusCode::NOT_FOUND);
    }
}
