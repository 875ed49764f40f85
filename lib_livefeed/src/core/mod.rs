//! # Core Engine Module
//!
//! The live-update client proper. Leaf to root:
//!
//! - **`reconnect`**: `ReconnectPolicy` and its fixed-interval and jittered
//!   exponential implementations. Pure functions of the attempt count.
//!
//! - **`registry`**: `SubscriptionRegistry`, one handler per event-type tag,
//!   last write wins.
//!
//! - **`dispatcher`**: `MessageDispatcher`, decodes `{type, data}` frames and
//!   invokes the matching handler with errors and panics contained.
//!
//! - **`connection`**: `ConnectionManager`, the connect / send / disconnect
//!   state machine that drives reconnection and feeds the dispatcher.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// The connection lifecycle state machine.
pub mod connection;
/// Frame decoding and handler invocation.
pub mod dispatcher;
/// Retry decisions for dropped connections.
pub mod reconnect;
/// Event-type to handler mapping.
pub mod registry;

// --- Public API Re-exports ---
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use reconnect::{ExponentialBackoffPolicy, FixedIntervalPolicy, ReconnectDecision, ReconnectPolicy};
pub use registry::{Handler, HandlerResult, SubscriptionRegistry};
