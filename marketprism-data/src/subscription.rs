use marketprism_instrument::{DataType, MarketType, Symbol};
use std::fmt;

/// A request to subscribe to one (symbol, data_type) pair under a
/// particular market type.
///
/// Grounded on `barter-data`'s `Subscription<Exchange, Instrument, Kind>`;
/// collapsed to a concrete struct since MarketPrism's `Connector`s are
/// concrete types, not generic over exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub market_type: MarketType,
    pub symbol: Symbol,
    pub data_type: DataType,
}

impl Subscription {
    pub fn new(market_type: MarketType, symbol: impl Into<Symbol>, data_type: DataType) -> Self {
        Self {
            market_type,
            symbol: symbol.into(),
            data_type,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.data_type.as_str(),
            self.market_type.as_str(),
            self.symbol
        )
    }
}
