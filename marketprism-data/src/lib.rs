#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # marketprism-data
//! Exchange connectors, local order-book synchronization and the raw event
//! types emitted upstream of the normalizer.
//!
//! Unlike `barter-data`'s fully generic `Connector`/`ExchangeTransformer`
//! machinery, MarketPrism only ever needs three concrete exchanges, so
//! [`exchange::Connector`] is a plain trait implemented by three structs and
//! dispatched through the [`exchange::AnyConnector`] tagged union rather
//! than through generics. See `DESIGN.md` for the rationale.

pub mod books;
pub mod error;
pub mod event;
pub mod exchange;
pub mod streams;
pub mod subscription;

pub use error::DataError;
pub use event::{MarketEvent, MarketPayload};
pub use exchange::{AnyConnector, Connector};
pub use subscription::Subscription;
