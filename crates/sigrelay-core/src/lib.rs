//! # Sigrelay Core
//!
//! Core types and error handling for the sigrelay trust-service relay.
//!
//! This crate provides the pieces every other crate builds on:
//! - Destination admission against a fixed hostname allowlist
//! - Outbound content-type resolution from the destination path
//! - The base64 relay envelope
//! - Error types and response helpers

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod allowlist;
pub mod content_type;
pub mod envelope;
pub mod error;
pub mod response;

pub use allowlist::{Allowlist, Destination, Rejection, MAX_ADDRESS_LENGTH};
pub use content_type::{ContentTypeRule, ContentTypeTable, PathMatch};
pub use error::{Error, Result};
pub use response::{Body, ResponseBuilder};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::allowlist::{Allowlist, Destination, Rejection};
    pub use crate::content_type::{ContentTypeRule, ContentTypeTable, PathMatch};
    pub use crate::envelope;
    pub use crate::error::{Error, Result};
    pub use crate::response::{responses, Body, ResponseBuilder};
}
