use thiserror::Error;

/// Transport-level failure shared by every WebSocket- or HTTP-speaking
/// component in the workspace.
///
/// This is deliberately smaller than `barter-integration`'s `SocketError`:
/// MarketPrism's connectors never subscribe through a shared multiplexed
/// socket, so the subscription-validation variants that type carries do not
/// apply here.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket sink closed")]
    SinkClosed,

    #[error("websocket connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse message: {error} | payload: {payload}")]
    Deserialize {
        error: serde_json::Error,
        payload: String,
    },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Terminal(String),
}

impl SocketError {
    /// `true` if reconnecting would not help — the caller should stop
    /// retrying and propagate the failure instead of backing off.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SocketError::Terminal(_) | SocketError::Url(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_variants_are_not_retried() {
        assert!(SocketError::Terminal("bad config".into()).is_terminal());
        assert!(!SocketError::SinkClosed.is_terminal());
    }
}
