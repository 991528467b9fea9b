use crate::error::SocketError;
use futures::stream::{SplitSink, SplitStream};
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// A connected WebSocket, split into independent read/write halves so a
/// connector can run its ping-scheduling task and its message-reading loop
/// concurrently.
pub type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WebSocket, WsMessage>;
pub type WsStream = SplitStream<WebSocket>;
pub type WsMessage = tokio_tungstenite::tungstenite::Message;
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Open a WebSocket connection and split it into a sink/stream pair.
pub async fn connect(url: &url::Url) -> Result<(WsSink, WsStream), SocketError> {
    let (socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    use futures::StreamExt;
    let (sink, stream) = socket.split();
    Ok((sink, stream))
}

/// Parses exchange WebSocket text frames into a concrete DTO, logging and
/// skipping (rather than terminating the connection on) any frame that
/// fails to parse as valid JSON for the target type.
pub trait WebSocketParser {
    fn parse<Output>(message: WsMessage) -> Option<Result<Output, SocketError>>
    where
        Output: DeserializeOwned;
}

/// Default [`WebSocketParser`] used by every exchange connector: text frames
/// are parsed as JSON, binary frames are rejected, and control frames
/// (ping/pong/close) are silently ignored since `tokio-tungstenite` answers
/// pings automatically.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWebSocketParser;

impl WebSocketParser for JsonWebSocketParser {
    fn parse<Output>(message: WsMessage) -> Option<Result<Output, SocketError>>
    where
        Output: DeserializeOwned,
    {
        match message {
            WsMessage::Text(text) => Some(
                serde_json::from_str(&text).map_err(|error| SocketError::Deserialize {
                    error,
                    payload: text.to_string(),
                }),
            ),
            WsMessage::Binary(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
                None
            }
            WsMessage::Close(_) => Some(Err(SocketError::SinkClosed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        ping: u64,
    }

    #[test]
    fn parses_text_frame_as_json() {
        let msg = WsMessage::Text(r#"{"ping":1}"#.to_string());
        let parsed: Option<Result<Ping, SocketError>> = JsonWebSocketParser::parse(msg);
        assert_eq!(parsed.unwrap().unwrap(), Ping { ping: 1 });
    }

    #[test]
    fn ignores_control_frames() {
        let msg = WsMessage::Ping(Vec::new());
        let parsed: Option<Result<Ping, SocketError>> = JsonWebSocketParser::parse(msg);
        assert!(parsed.is_none());
    }

    #[test]
    fn surfaces_malformed_json_as_error_without_killing_the_parser() {
        let msg = WsMessage::Text("not json".to_string());
        let parsed: Option<Result<Ping, SocketError>> = JsonWebSocketParser::parse(msg);
        assert!(matches!(parsed, Some(Err(SocketError::Deserialize { .. }))));
    }
}
