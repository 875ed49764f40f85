//! # Transport Connectors
//!
//! The `ConnectionManager` never talks to a socket directly. It asks a
//! `Connector` to open its target address and receives a `TransportIo`: a sink
//! for outbound text and a stream of inbound text frames. That seam keeps the
//! reconnect state machine independent of the wire, and lets tests drive the
//! manager with scripted in-memory transports.
//!
//! ## Contained Modules:
//! - **`ws`**: The production connector, a `tokio-tungstenite` WebSocket client
//!   (behind the `ws` feature).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};

use crate::error::LiveFeedError;

/// The tokio-tungstenite WebSocket connector.
#[cfg(feature = "ws")]
pub mod ws;

#[cfg(feature = "ws")]
pub use ws::WsConnector;

/// Outbound half of an open transport.
pub type TransportSink = Pin<Box<dyn Sink<String, Error = LiveFeedError> + Send>>;

/// Inbound half of an open transport. The stream ending means the peer closed
/// the connection; an `Err` item means the transport failed.
pub type TransportStream = Pin<Box<dyn Stream<Item = Result<String, LiveFeedError>> + Send>>;

/// An open, duplex text transport.
pub struct TransportIo {
    /// Where serialized outbound messages are written.
    pub sink: TransportSink,
    /// Where inbound text frames arrive.
    pub stream: TransportStream,
}

impl TransportIo {
    /// Bundles a sink and a stream.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = LiveFeedError> + Send + 'static,
        St: Stream<Item = Result<String, LiveFeedError>> + Send + 'static,
    {
        Self { sink: Box::pin(sink), stream: Box::pin(stream) }
    }
}

/// # Connector
///
/// Opens a transport to a target address. Each call must produce a fresh,
/// independent connection.
pub trait Connector: Send + Sync + 'static {
    /// Opens a connection to `target`.
    fn open(&self, target: &str) -> BoxFuture<'static, Result<TransportIo, LiveFeedError>>;
}
