//! # WebSocket Connector
//!
//! Opens the live channel with `tokio_tungstenite::connect_async` and adapts the
//! split socket to the text-only `TransportIo` the connection manager expects.
//!
//! - Text frames pass through unchanged.
//! - Binary frames are decoded as lossy UTF-8; if the result is not a valid
//!   event frame, the dispatcher drops it as malformed.
//! - Ping/pong and raw frames are swallowed (tungstenite answers pings itself
//!   while the stream is being polled).
//! - A close frame ends the inbound stream.

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::LiveFeedError;
use crate::ingestors::{Connector, TransportIo};

/// Production connector for `ws://` and `wss://` targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates the connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, target: &str) -> BoxFuture<'static, Result<TransportIo, LiveFeedError>> {
        let target = target.to_string();
        async move {
            log::info!("Connecting to live feed: {}", target);
            let (ws_stream, _response) = connect_async(target.as_str()).await?;
            let (write, read) = ws_stream.split();

            let sink = write
                .sink_map_err(LiveFeedError::from)
                .with(|text: String| future::ready(Ok::<_, LiveFeedError>(Message::Text(text.into()))));

            let stream = read
                .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
                .filter_map(|msg| {
                    future::ready(match msg {
                        Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                        Ok(Message::Binary(bin)) => Some(Ok(String::from_utf8_lossy(&bin).into_owned())),
                        Ok(_) => None,
                        Err(e) => Some(Err(LiveFeedError::from(e))),
                    })
                });

            Ok(TransportIo::new(sink, stream))
        }
        .boxed()
    }
}
