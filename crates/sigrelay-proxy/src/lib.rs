//! # Sigrelay Proxy
//!
//! Outbound side of the relay:
//! - A [`Transport`] seam over which upstream calls are made
//! - A hyper-based [`HttpClient`] with plain and TLS transports
//! - The [`RelayExecutor`], which labels, sends, buffers and re-encodes

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod client;
pub mod relay;
pub mod tls;

pub use client::{ClientConfig, HttpClient, Transport, UpstreamRequest, UpstreamResponse};
pub use relay::{ExecutorConfig, RelayExecutor};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClientConfig, HttpClient, Transport, UpstreamRequest, UpstreamResponse};
    pub use crate::relay::{ExecutorConfig, RelayExecutor};
}
