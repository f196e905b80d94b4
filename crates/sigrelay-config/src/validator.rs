//! Configuration validation

use crate::types::{Config, CorsConfig};
use sigrelay_core::{Error, Result};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_relay(config)?;
    validate_cors(&config.effective_cors())?;
    validate_observability(config)?;

    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    let server = &config.server;

    if server.request_timeout.is_zero() {
        return Err(Error::Config("request_timeout must be > 0".to_string()));
    }

    if server.request_timeout.as_secs() > 300 {
        tracing::warn!("request_timeout is very high (>5 minutes)");
    }

    if server.body_read_timeout.is_zero() {
        return Err(Error::Config("body_read_timeout must be > 0".to_string()));
    }

    if server.max_body_size == 0 {
        return Err(Error::Config("max_body_size must be > 0".to_string()));
    }

    if let Some(ref dir) = server.static_dir {
        if dir.as_os_str().is_empty() {
            return Err(Error::Config("static_dir cannot be empty".to_string()));
        }
    }

    Ok(())
}

fn validate_relay(config: &Config) -> Result<()> {
    let relay = &config.relay;

    if relay.user_agent.trim().is_empty() {
        return Err(Error::Config("user_agent cannot be empty".to_string()));
    }
    http::HeaderValue::from_str(&relay.user_agent)
        .map_err(|_| Error::Config(format!("Invalid user_agent: {:?}", relay.user_agent)))?;

    if relay.connect_timeout.is_zero() {
        return Err(Error::Config("connect_timeout must be > 0".to_string()));
    }

    if relay.max_response_size == 0 {
        return Err(Error::Config("max_response_size must be > 0".to_string()));
    }

    http::HeaderName::from_bytes(relay.upstream_status_header.as_bytes()).map_err(|_| {
        Error::Config(format!(
            "Invalid upstream_status_header: {:?}",
            relay.upstream_status_header
        ))
    })?;

    if relay.allowlist.is_empty() {
        return Err(Error::Config("allowlist cannot be empty".to_string()));
    }

    for host in &relay.allowlist {
        validate_host_entry(host)?;
    }

    if let Some(ref table) = relay.content_types {
        for rule in &table.rules {
            if rule.pattern.is_empty() {
                return Err(Error::Config(
                    "content type rule pattern cannot be empty".to_string(),
                ));
            }
            validate_content_type(&rule.content_type)?;
        }
        validate_content_type(&table.fallback)?;
    }

    Ok(())
}

fn validate_host_entry(host: &str) -> Result<()> {
    let invalid = |reason: &str| Error::Config(format!("Invalid allowlist entry {host:?}: {reason}"));

    if host.trim().is_empty() {
        return Err(invalid("empty hostname"));
    }

    if host.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    if host.contains('*') {
        return Err(invalid("wildcards are not supported"));
    }

    if host.contains('/') {
        return Err(invalid("expected a hostname, not a URL"));
    }

    let bracketed_ipv6 = host.starts_with('[') && host.ends_with(']');
    if host.contains(':') && !bracketed_ipv6 {
        return Err(invalid("ports are not part of the hostname"));
    }

    Ok(())
}

fn validate_content_type(value: &str) -> Result<()> {
    // Empty is meaningful: the header is omitted
    if value.is_empty() {
        return Ok(());
    }
    http::HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| Error::Config(format!("Invalid content type: {value:?}")))
}

fn validate_cors(cors: &CorsConfig) -> Result<()> {
    if cors.allow_origin.is_empty() {
        return Err(Error::Config("cors allow_origin cannot be empty".to_string()));
    }

    for method in &cors.allow_methods {
        method
            .parse::<http::Method>()
            .map_err(|_| Error::Config(format!("Invalid CORS method: {method}")))?;
    }

    for name in cors.allow_headers.iter().chain(cors.expose_headers.iter()) {
        http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Config(format!("Invalid CORS header name: {name}")))?;
    }

    Ok(())
}

fn validate_observability(config: &Config) -> Result<()> {
    if config.observability.logging.level.trim().is_empty() {
        return Err(Error::Config("logging level cannot be empty".to_string()));
    }

    Ok(())
}
