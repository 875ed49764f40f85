//! # lib_livefeed
//!
//! Real-time update client for the trading dashboard. One long-lived WebSocket
//! connection to the API server is kept alive with bounded reconnection, and
//! every pushed `{ "type": ..., "data": ... }` frame is routed to the handler
//! registered for its type.
//!
//! ```rust,no_run
//! use lib_livefeed::{load_config, ConnectionManager, MetricsUpdate, METRICS_UPDATE};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let live = ConnectionManager::from_config(&config)?;
//!
//!     live.subscribe_typed(METRICS_UPDATE, |update: MetricsUpdate| {
//!         log::info!("balance is now {}", update.balance);
//!         Ok(())
//!     });
//!     live.connect();
//!
//!     tokio::signal::ctrl_c().await?;
//!     live.disconnect();
//!     Ok(())
//! }
//! ```

pub mod configs;
pub mod core;
pub mod error;
pub mod events;
pub mod ingestors;
#[cfg(feature = "loggers")]
pub mod loggers;

pub use configs::{load_config, BackoffKind, LiveClientConfig};
pub use crate::core::{
    ConnectionManager, ConnectionState, DispatchOutcome, ExponentialBackoffPolicy, FixedIntervalPolicy,
    Handler, HandlerResult, MessageDispatcher, ReconnectDecision, ReconnectPolicy, SubscriptionRegistry,
};
pub use error::{LiveFeedError, LiveFeedResult};
pub use events::{EventKind, InboundFrame, LiveEvent, MetricsUpdate, METRICS_UPDATE};
pub use ingestors::{Connector, TransportIo};
#[cfg(feature = "ws")]
pub use ingestors::WsConnector;
