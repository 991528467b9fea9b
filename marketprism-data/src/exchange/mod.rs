//! The three concrete exchange connectors and the `Connector` trait they
//! share, plus the [`AnyConnector`] tagged union the supervisor dispatches
//! through instead of a trait object.
//!
//! Grounded on `barter-data`'s `Connector` trait (`lib.rs`), simplified per
//! `SPEC_FULL.md`'s Design Note §9 redesign flag: three exchanges do not
//! need a fully generic, monomorphized-per-exchange stream type.

pub mod binance;
pub mod deribit;
pub mod okx;

use crate::error::DataError;
use crate::event::MarketEvent;
use crate::subscription::Subscription;
use async_trait::async_trait;
use marketprism_instrument::ExchangeId;

pub use binance::BinanceConnector;
pub use deribit::DeribitConnector;
pub use okx::OkxConnector;

/// Shared behaviour every exchange connector implements.
#[async_trait]
pub trait Connector {
    const ID: ExchangeId;

    /// Open the WebSocket session (and, where needed, start REST polling
    /// loops for non-push data types).
    async fn connect(&mut self) -> Result<(), DataError>;

    /// Register interest in a (symbol, data_type) pair. Idempotent; errors
    /// if the exchange does not support the combination.
    fn subscribe(&mut self, sub: Subscription) -> Result<(), DataError>;

    /// Pull the next decoded event, or `None` once the connector has been
    /// told to shut down and has drained its internal buffers.
    async fn next_event(&mut self) -> Option<Result<MarketEvent, DataError>>;

    async fn shutdown(&mut self);
}

/// Tagged union over the three supported connectors. The supervisor and
/// collector binary hold a `Vec<AnyConnector>` and match on it directly —
/// no dynamic dispatch, no generic monomorphization per exchange.
pub enum AnyConnector {
    Binance(BinanceConnector),
    Okx(OkxConnector),
    Deribit(DeribitConnector),
}

impl AnyConnector {
    pub fn exchange_id(&self) -> ExchangeId {
        match self {
            AnyConnector::Binance(_) => ExchangeId::Binance,
            AnyConnector::Okx(_) => ExchangeId::Okx,
            AnyConnector::Deribit(_) => ExchangeId::Deribit,
        }
    }

    pub async fn connect(&mut self) -> Result<(), DataError> {
        match self {
            AnyConnector::Binance(c) => c.connect().await,
            AnyConnector::Okx(c) => c.connect().await,
            AnyConnector::Deribit(c) => c.connect().await,
        }
    }

    pub fn subscribe(&mut self, sub: Subscription) -> Result<(), DataError> {
        match self {
            AnyConnector::Binance(c) => c.subscribe(sub),
            AnyConnector::Okx(c) => c.subscribe(sub),
            AnyConnector::Deribit(c) => c.subscribe(sub),
        }
    }

    pub async fn next_event(&mut self) -> Option<Result<MarketEvent, DataError>> {
        match self {
            AnyConnector::Binance(c) => c.next_event().await,
            AnyConnector::Okx(c) => c.next_event().await,
            AnyConnector::Deribit(c) => c.next_event().await,
        }
    }

    pub async fn shutdown(&mut self) {
        match self {
            AnyConnector::Binance(c) => c.shutdown().await,
            AnyConnector::Okx(c) => c.shutdown().await,
            AnyConnector::Deribit(c) => c.shutdown().await,
        }
    }
}

/// Checks a (market_type, data_type) pair against an exchange's supported
/// matrix (`SPEC_FULL.md` §4.1), used by every connector's `subscribe`.
pub(crate) fn require_supported(
    exchange: ExchangeId,
    sub: &Subscription,
    supported: &[(marketprism_instrument::MarketType, marketprism_instrument::DataType)],
) -> Result<(), DataError> {
    if supported
        .iter()
        .any(|(mt, dt)| *mt == sub.market_type && *dt == sub.data_type)
    {
        Ok(())
    } else {
        tracing::warn!(
            %exchange,
            market_type = sub.market_type.as_str(),
            data_type = sub.data_type.as_str(),
            "unsupported subscription combination"
        );
        Err(DataError::UnsupportedCombination {
            data_type: sub.data_type.as_str(),
            market_type: sub.market_type.as_str(),
        })
    }
}
