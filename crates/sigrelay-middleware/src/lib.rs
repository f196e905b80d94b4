//! # Sigrelay Middleware
//!
//! Request/response concerns shared by the dispatcher:
//! - CORS preflight answers and response decoration
//! - Bounded, time-limited inbound body reads

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod cors;
pub mod limits;

pub use cors::CorsPolicy;
pub use limits::BodyLimits;
