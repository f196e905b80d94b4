//! Configuration types

use serde::{Deserialize, Serialize};
use sigrelay_core::allowlist::DEFAULT_HOSTS;
use sigrelay_core::{Allowlist, ContentTypeTable};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Header carrying the upstream status code when exposure is enabled
pub const DEFAULT_UPSTREAM_STATUS_HEADER: &str = "X-Upstream-Status";

/// Port the relay listens on when nothing else is configured
pub const DEFAULT_PORT: u16 = 10000;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Relay behaviour
    #[serde(default)]
    pub relay: RelayConfig,

    /// CORS header set; the profile default applies when absent
    #[serde(default)]
    pub cors: Option<CorsConfig>,

    /// Observability
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// CORS settings in effect
    ///
    /// Without an explicit `cors` block the profile's header set applies,
    /// exposing whichever upstream-status header the relay actually sends.
    pub fn effective_cors(&self) -> CorsConfig {
        if let Some(ref cors) = self.cors {
            return cors.clone();
        }

        CorsConfig {
            expose_headers: self
                .relay
                .status_header()
                .map(str::to_string)
                .into_iter()
                .collect(),
            ..CorsConfig::for_profile(self.relay.profile)
        }
    }

    /// Replace the listening port, keeping the address
    pub fn set_port(&mut self, port: u16) {
        self.server.listen.set_port(port);
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Bound on the whole upstream exchange
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Bound on reading an inbound request body
    #[serde(default = "default_body_read_timeout", with = "humantime_serde")]
    pub body_read_timeout: Duration,

    /// Graceful shutdown timeout (wait for in-flight requests)
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Max inbound request body size (bytes of base64 text)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Root of the static assets served when no `address` is given
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout: default_timeout(),
            body_read_timeout: default_body_read_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            max_body_size: default_max_body_size(),
            static_dir: None,
        }
    }
}

/// Which historical relay variant to reproduce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayProfile {
    /// Exact-path OCSP/TSP/CMP table, JSON APIs, CORS on every response,
    /// upstream status exposed in a header
    #[default]
    Standard,
    /// Substring OCSP/TSP table, CORS only on preflight and relay responses
    Legacy,
}

impl RelayProfile {
    /// Content-type table of this profile
    pub fn content_types(self) -> ContentTypeTable {
        match self {
            Self::Standard => ContentTypeTable::standard(),
            Self::Legacy => ContentTypeTable::legacy(),
        }
    }

    /// Whether the upstream status is exposed by default
    pub fn exposes_upstream_status(self) -> bool {
        matches!(self, Self::Standard)
    }
}

/// Relay behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Historical variant
    #[serde(default)]
    pub profile: RelayProfile,

    /// `User-Agent` sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream TCP connect timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Max buffered upstream response body (bytes)
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,

    /// Skip upstream certificate verification.
    ///
    /// Destinations are trusted by allowlisted hostname, not by certificate
    /// chain; several trust-service endpoints present chains rooted outside
    /// public trust stores.
    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,

    /// Expose the upstream status code; `None` follows the profile
    #[serde(default)]
    pub expose_upstream_status: Option<bool>,

    /// Header name used to expose the upstream status code
    #[serde(default = "default_upstream_status_header")]
    pub upstream_status_header: String,

    /// Admitted destination hosts
    #[serde(default = "default_allowlist")]
    pub allowlist: Vec<String>,

    /// Explicit content-type table; `None` follows the profile
    #[serde(default)]
    pub content_types: Option<ContentTypeTable>,
}

impl RelayConfig {
    /// Build the immutable allowlist
    pub fn allowlist(&self) -> Allowlist {
        Allowlist::new(&self.allowlist)
    }

    /// Content-type table in effect
    pub fn content_table(&self) -> ContentTypeTable {
        self.content_types
            .clone()
            .unwrap_or_else(|| self.profile.content_types())
    }

    /// Header carrying the upstream status, when enabled
    pub fn status_header(&self) -> Option<&str> {
        self.expose_upstream_status
            .unwrap_or_else(|| self.profile.exposes_upstream_status())
            .then_some(self.upstream_status_header.as_str())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            profile: RelayProfile::default(),
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            max_response_size: default_max_response_size(),
            insecure_skip_verify: true,
            expose_upstream_status: None,
            upstream_status_header: default_upstream_status_header(),
            allowlist: default_allowlist(),
            content_types: None,
        }
    }
}

/// CORS header set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorsConfig {
    /// `Access-Control-Allow-Origin`
    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,

    /// `Access-Control-Allow-Methods`
    #[serde(default = "default_allow_methods")]
    pub allow_methods: Vec<String>,

    /// `Access-Control-Allow-Headers`
    #[serde(default = "default_allow_headers")]
    pub allow_headers: Vec<String>,

    /// `Access-Control-Expose-Headers`
    #[serde(default)]
    pub expose_headers: Vec<String>,

    /// `Access-Control-Max-Age` on preflight responses
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,

    /// Also attach CORS headers to rejections and errors
    #[serde(default = "default_true")]
    pub decorate_errors: bool,
}

impl CorsConfig {
    /// Header set of a relay profile
    pub fn for_profile(profile: RelayProfile) -> Self {
        match profile {
            RelayProfile::Standard => Self {
                expose_headers: vec![DEFAULT_UPSTREAM_STATUS_HEADER.to_string()],
                decorate_errors: true,
                ..Self::base()
            },
            RelayProfile::Legacy => Self {
                expose_headers: Vec::new(),
                decorate_errors: false,
                ..Self::base()
            },
        }
    }

    fn base() -> Self {
        Self {
            allow_origin: default_allow_origin(),
            allow_methods: default_allow_methods(),
            allow_headers: default_allow_headers(),
            expose_headers: Vec::new(),
            max_age: None,
            decorate_errors: true,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::for_profile(RelayProfile::default())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_body_read_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_max_response_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_user_agent() -> String {
    "signature.proxy".to_string()
}

fn default_upstream_status_header() -> String {
    DEFAULT_UPSTREAM_STATUS_HEADER.to_string()
}

fn default_allowlist() -> Vec<String> {
    DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_allow_methods() -> Vec<String> {
    vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()]
}

fn default_allow_headers() -> Vec<String> {
    vec!["Content-Type".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_historical_relay() {
        let config = Config::default();
        assert_eq!(config.server.listen.port(), DEFAULT_PORT);
        assert_eq!(config.relay.user_agent, "signature.proxy");
        assert!(config.relay.insecure_skip_verify);
        assert!(config.relay.allowlist().contains("ca.gov.ua"));
        assert_eq!(config.relay.allowlist().len(), DEFAULT_HOSTS.len());
    }

    #[test]
    fn test_profile_resolution() {
        let mut config = Config::default();
        assert_eq!(config.relay.status_header(), Some("X-Upstream-Status"));
        assert_eq!(config.relay.content_table().resolve("/cmp"), "");
        assert!(config.effective_cors().decorate_errors);

        config.relay.profile = RelayProfile::Legacy;
        assert_eq!(config.relay.status_header(), None);
        assert_eq!(
            config.relay.content_table().resolve("/cmp"),
            "application/octet-stream"
        );
        let cors = config.effective_cors();
        assert!(!cors.decorate_errors);
        assert!(cors.expose_headers.is_empty());

        config.relay.expose_upstream_status = Some(true);
        assert_eq!(config.relay.status_header(), Some("X-Upstream-Status"));
    }

    #[test]
    fn test_set_port() {
        let mut config = Config::default();
        config.set_port(8088);
        assert_eq!(config.server.listen.to_string(), "0.0.0.0:8088");
    }

    #[test]
    fn test_expose_headers_follow_status_header() {
        let mut config = Config::default();
        config.relay.upstream_status_header = "X-Relay-Status".to_string();
        assert_eq!(config.effective_cors().expose_headers, vec!["X-Relay-Status"]);

        config.relay.profile = RelayProfile::Legacy;
        assert!(config.effective_cors().expose_headers.is_empty());

        config.relay.expose_upstream_status = Some(true);
        assert_eq!(config.effective_cors().expose_headers, vec!["X-Relay-Status"]);

        // An explicit block is taken as written
        config.cors = Some(CorsConfig::for_profile(RelayProfile::Legacy));
        assert!(config.effective_cors().expose_headers.is_empty());
    }

    #[test]
    fn test_relay_profile_serde() {
        let json = serde_json::to_string(&RelayProfile::Legacy).unwrap();
        assert_eq!(json, "\"legacy\"");

        let profile: RelayProfile = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(profile, RelayProfile::Standard);
    }
}
