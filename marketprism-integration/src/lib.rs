#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # marketprism-integration
//! Transport-agnostic primitives shared by every exchange connector and by
//! the publisher: [`SocketError`], a thin WebSocket type alias layer, the
//! `de` module's timestamp/decimal deserializers and the token-bucket
//! [`rate_limit::RateLimiter`].

pub mod channel;
pub mod de;
pub mod error;
pub mod protocol;
pub mod rate_limit;

pub use error::SocketError;
pub use rate_limit::{Priority, RateLimiter};
