//! axum WebSocket implementations of the core connection traits.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::{ConnectionError, Inbound, Outbound};
use parley_protocol::{codec, Message};
use tracing::debug;

/// Split an upgraded socket into its two capability halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WsOutbound, WsInbound) {
    let (sink, stream) = socket.split();
    (WsOutbound { sink }, WsInbound { stream })
}

/// Write half of an upgraded WebSocket. Handed to the registry at join
/// time and exclusively owned by its loop from then on.
pub struct WsOutbound {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl Outbound for WsOutbound {
    async fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
        let text = codec::encode(message).map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
        self.sink
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) {
        // Best-effort: the peer may already be gone.
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

/// Read half of an upgraded WebSocket. Owned by the session's read loop.
pub struct WsInbound {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl Inbound for WsInbound {
    async fn next(&mut self) -> Option<Result<Message, ConnectionError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Some(
                        codec::decode(&text).map_err(|e| ConnectionError::Decode(e.to_string())),
                    );
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    return Some(
                        codec::decode_bytes(&data)
                            .map_err(|e| ConnectionError::Decode(e.to_string())),
                    );
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                    // Answered by the websocket layer itself.
                }
                Some(Ok(WsMessage::Close(_))) => {
                    debug!("received close frame");
                    return None;
                }
                Some(Err(e)) => {
                    return Some(Err(ConnectionError::ReceiveFailed(e.to_string())));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return None;
                }
            }
        }
    }
}
