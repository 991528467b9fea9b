use marketprism_integration::SocketError;
use thiserror::Error;

/// Failure surfaced by a connector up to its supervising task.
///
/// Grounded on `barter-data`'s `DataError`, trimmed to the failure modes a
/// single concrete connector can actually produce (no generic subscription
/// validation, since MarketPrism's subscriptions are fixed per exchange).
#[derive(Debug, Error)]
pub enum DataError {
    #[error("transport error: {0}")]
    Socket(#[from] SocketError),

    #[error("exchange does not support {data_type} for {market_type}")]
    UnsupportedCombination {
        data_type: &'static str,
        market_type: &'static str,
    },

    #[error("{consecutive} malformed/auth failures in the last {window_secs}s, treating as fatal")]
    Fatal {
        consecutive: u32,
        window_secs: u64,
    },
}

impl DataError {
    /// `true` when the supervisor should restart the connector rather than
    /// give up for good.
    pub fn is_terminal(&self) -> bool {
        match self {
            DataError::Socket(e) => e.is_terminal(),
            DataError::UnsupportedCombination { .. } => true,
            DataError::Fatal { .. } => true,
        }
    }
}
