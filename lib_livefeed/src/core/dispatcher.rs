//! # Message Dispatcher
//!
//! The `MessageDispatcher` sits between the session task and the
//! `SubscriptionRegistry`. For every text frame the transport delivers it:
//!
//! 1.  **Decodes** the frame as `{ "type": ..., "data": ... }`. A frame that is
//!     not valid JSON, or lacks a string `type`, is a data error: it is logged
//!     and dropped here and never reaches the connection loop.
//! 2.  **Looks up** the handler for `type`. An unsubscribed type is normal
//!     traffic and is dropped silently.
//! 3.  **Invokes** the handler synchronously with `data`. A handler that returns
//!     an error, or panics, is contained at this boundary so that one faulty
//!     consumer cannot take the live channel down for everyone else.
//!
//! `dispatch` returns a `DispatchOutcome` describing what happened. It is purely
//! informational; no outcome is an error for the caller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::registry::SubscriptionRegistry;
use crate::events::InboundFrame;

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler for this event type ran and returned `Ok`.
    Delivered,
    /// No handler is registered for this event type.
    Unhandled,
    /// The frame could not be decoded.
    Malformed,
    /// The handler returned an error or panicked.
    HandlerFailed,
}

/// Routes decoded frames to registered handlers.
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    registry: Arc<SubscriptionRegistry>,
}

impl MessageDispatcher {
    /// Creates a dispatcher reading handlers from `registry`.
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// # Dispatch
    ///
    /// Decodes `raw` and hands its payload to the matching handler, if any.
    /// Never panics and never returns an error.
    pub fn dispatch(&self, raw: &str) -> DispatchOutcome {
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping malformed frame ({}): {}", e, truncate(raw, 256));
                return DispatchOutcome::Malformed;
            }
        };
        self.dispatch_frame(frame)
    }

    /// Hands an already decoded frame to its handler.
    pub fn dispatch_frame(&self, frame: InboundFrame) -> DispatchOutcome {
        let Some(handler) = self.registry.lookup(&frame.event_type) else {
            log::trace!("No handler for '{}', dropping frame", frame.event_type);
            return DispatchOutcome::Unhandled;
        };

        let event_type = frame.event_type;
        match panic::catch_unwind(AssertUnwindSafe(|| handler(frame.payload))) {
            Ok(Ok(())) => DispatchOutcome::Delivered,
            Ok(Err(e)) => {
                log::error!("Handler for '{}' failed: {:#}", event_type, e);
                DispatchOutcome::HandlerFailed
            }
            Err(cause) => {
                log::error!("Handler for '{}' panicked: {}", event_type, panic_message(&*cause));
                DispatchOutcome::HandlerFailed
            }
        }
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    if raw.len() <= max {
        return raw;
    }
    let mut end = max;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}
