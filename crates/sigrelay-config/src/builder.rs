//! Configuration builder

use crate::types::{Config, CorsConfig, RelayProfile};
use sigrelay_core::ContentTypeTable;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder starting from defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.config.server.listen = addr;
        self
    }

    /// Set relay profile
    pub fn profile(mut self, profile: RelayProfile) -> Self {
        self.config.relay.profile = profile;
        self
    }

    /// Replace the allowlist
    pub fn allowlist<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.relay.allowlist = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the upstream request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    /// Set the inbound body limit
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.server.max_body_size = bytes;
        self
    }

    /// Set the buffered upstream response limit
    pub fn max_response_size(mut self, bytes: usize) -> Self {
        self.config.relay.max_response_size = bytes;
        self
    }

    /// Serve static assets from `dir`
    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.server.static_dir = Some(dir.into());
        self
    }

    /// Override the content-type table
    pub fn content_types(mut self, table: ContentTypeTable) -> Self {
        self.config.relay.content_types = Some(table);
        self
    }

    /// Override the CORS header set
    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = Some(cors);
        self
    }

    /// Toggle upstream certificate verification
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.config.relay.insecure_skip_verify = skip;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> sigrelay_core::Result<Config> {
        crate::validator::validate_config(&self.config)?;
        Ok(self.config)
    }
}
