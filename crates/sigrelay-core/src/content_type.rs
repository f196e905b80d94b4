//! Outbound `Content-Type` resolution
//!
//! The relay labels each upstream request from the shape of the destination
//! path alone. Resolution is a first-match walk over an ordered rule table;
//! the table is data so deployments can extend it from configuration.

use serde::{Deserialize, Serialize};

/// JSON API content type
pub const APPLICATION_JSON: &str = "application/json";
/// OCSP request content type
pub const OCSP_REQUEST: &str = "application/ocsp-request";
/// RFC 3161 timestamp query content type
pub const TIMESTAMP_QUERY: &str = "application/timestamp-query";
/// Generic binary content type
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Path fragments of signing, cloud-key and identity service APIs
const JSON_API_FRAGMENTS: &[&str] = &[
    "/api/", "/ss/", "/cloud/", "/rest/", "/smartid/", "/vtms/", "/cihsm/",
];

const OCSP_PATHS: &[&str] = &[
    "/ocsp",
    "/ocsp/",
    "/services/ocsp",
    "/services/ocsp/",
    "/public/ocsp",
    "/public/ocsp/",
    "/ocsp-rsa",
    "/ocsp-ecdsa",
];

const TSP_PATHS: &[&str] = &[
    "/tsp",
    "/tsp/",
    "/services/tsp",
    "/services/tsp/",
    "/public/tsp",
    "/public/tsp/",
    "/tsp-rsa",
    "/tsp-ecdsa",
];

// CMP responders refuse requests that carry any Content-Type at all
const CMP_PATHS: &[&str] = &[
    "/cmp",
    "/cmp/",
    "/services/cmp",
    "/services/cmp/",
    "/public/cmp",
    "/public/cmp/",
];

/// How a rule's pattern is compared with the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    /// Path contains the pattern anywhere
    Contains,
    /// Path equals the pattern
    Exact,
}

/// One row of the content-type table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeRule {
    /// Comparison mode
    #[serde(rename = "match")]
    pub kind: PathMatch,

    /// Path fragment or exact path
    pub pattern: String,

    /// Content type to send; empty means the header is omitted
    #[serde(default)]
    pub content_type: String,
}

impl ContentTypeRule {
    /// Rule matching paths that contain `pattern`
    pub fn contains(pattern: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            kind: PathMatch::Contains,
            pattern: pattern.into(),
            content_type: content_type.into(),
        }
    }

    /// Rule matching paths equal to `pattern`
    pub fn exact(pattern: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            kind: PathMatch::Exact,
            pattern: pattern.into(),
            content_type: content_type.into(),
        }
    }

    /// Whether this rule applies to `path`
    pub fn matches(&self, path: &str) -> bool {
        match self.kind {
            PathMatch::Contains => path.contains(self.pattern.as_str()),
            PathMatch::Exact => path == self.pattern,
        }
    }
}

/// Ordered content-type rules plus a fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeTable {
    /// Rules, first match wins
    #[serde(default)]
    pub rules: Vec<ContentTypeRule>,

    /// Content type when no rule matches
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

fn default_fallback() -> String {
    OCTET_STREAM.to_string()
}

impl ContentTypeTable {
    /// Table with no rules
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Append a rule (lowest precedence so far)
    pub fn with_rule(mut self, rule: ContentTypeRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// JSON fragments, then exact OCSP, TSP and CMP endpoints
    pub fn standard() -> Self {
        let json = JSON_API_FRAGMENTS
            .iter()
            .map(|p| ContentTypeRule::contains(*p, APPLICATION_JSON));
        let ocsp = OCSP_PATHS
            .iter()
            .map(|p| ContentTypeRule::exact(*p, OCSP_REQUEST));
        let tsp = TSP_PATHS
            .iter()
            .map(|p| ContentTypeRule::exact(*p, TIMESTAMP_QUERY));
        let cmp = CMP_PATHS.iter().map(|p| ContentTypeRule::exact(*p, ""));

        Self {
            rules: json.chain(ocsp).chain(tsp).chain(cmp).collect(),
            fallback: default_fallback(),
        }
    }

    /// Substring table of the first relay deployment
    pub fn legacy() -> Self {
        Self::new(OCTET_STREAM)
            .with_rule(ContentTypeRule::contains("/ocsp", OCSP_REQUEST))
            .with_rule(ContentTypeRule::contains("/tsp", TIMESTAMP_QUERY))
    }

    /// Content type for a destination path; empty means "send no header"
    pub fn resolve(&self, path: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| rule.content_type.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

impl Default for ContentTypeTable {
    fn default() -> Self {
        Self::standard()
    }
}
