//! # Subscription Registry
//!
//! Maps an event-type tag to exactly one handler. Registering a second handler
//! for the same tag replaces the first (last write wins); removing an absent tag
//! is a no-op. The map sits behind a mutex, and `lookup` hands out a cloned
//! `Arc` so the lock is never held while a handler runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::events::{EventKind, InboundFrame, LiveEvent};

/// What a handler returns. Errors are logged by the dispatcher and never
/// travel further.
pub type HandlerResult = anyhow::Result<()>;

/// A registered payload handler.
pub type Handler = Arc<dyn Fn(Value) -> HandlerResult + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        // Handlers never run under this lock, so poisoning can only come from a
        // panic inside HashMap itself; the map is still consistent.
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for `event_type`, replacing any previous one.
    pub fn subscribe<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(Value) -> HandlerResult + Send + Sync + 'static,
    {
        let replaced = self.lock().insert(event_type.to_string(), Arc::new(handler));
        if replaced.is_some() {
            log::debug!("Replaced handler for '{}'", event_type);
        } else {
            log::debug!("Registered handler for '{}'", event_type);
        }
    }

    /// Registers a handler that receives the payload deserialized as `T`.
    ///
    /// A payload that does not fit `T` counts as a failed invocation of this
    /// handler.
    pub fn subscribe_typed<T, F>(&self, event_type: &str, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(event_type, move |payload| {
            let typed: T = serde_json::from_value(payload)?;
            handler(typed)
        });
    }

    /// Registers a handler for a known event kind, receiving the decoded
    /// `LiveEvent`. A payload that does not fit the kind counts as a failed
    /// invocation of this handler.
    pub fn subscribe_kind<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(LiveEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(kind.as_str(), move |payload| {
            let frame = InboundFrame { event_type: kind.as_str().to_string(), payload };
            handler(LiveEvent::from_frame(frame)?)
        });
    }

    /// Removes the handler for `event_type`. Returns whether one was present.
    pub fn unsubscribe(&self, event_type: &str) -> bool {
        let removed = self.lock().remove(event_type).is_some();
        if removed {
            log::debug!("Unregistered handler for '{}'", event_type);
        }
        removed
    }

    /// Returns the handler registered for `event_type`, if any.
    pub fn lookup(&self, event_type: &str) -> Option<Handler> {
        self.lock().get(event_type).cloned()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.lock().contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every handler.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        f.debug_struct("SubscriptionRegistry").field("event_types", &keys).finish()
    }
}
