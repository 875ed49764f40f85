//! # Connection Manager
//!
//! Owns the lifecycle of the single live connection:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting <-> Connecting
//!                                                 |
//!                     disconnect() / retries exhausted -> Closed
//! ```
//!
//! `connect()` spawns one session task per manager. The task opens the
//! transport through its `Connector`, pumps inbound frames into the
//! `MessageDispatcher` and outbound messages into the sink, and when the
//! transport fails or the peer goes away it consults the `ReconnectPolicy`.
//! The wait between attempts races a per-session `CancellationToken`, so
//! `disconnect()` stops a pending reconnect immediately.
//!
//! Every state change made by the session task is checked against its token
//! while holding the state lock, and `disconnect()` cancels that token under
//! the same lock. Once `disconnect()` returns, a stale task can no longer move
//! the manager out of `Closed`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::dispatcher::MessageDispatcher;
use crate::core::reconnect::ReconnectPolicy;
use crate::core::registry::{HandlerResult, SubscriptionRegistry};
use crate::events::{EventKind, LiveEvent};
use crate::ingestors::{Connector, TransportIo, TransportSink};

#[cfg(feature = "ws")]
use crate::configs::LiveClientConfig;
#[cfg(feature = "ws")]
use crate::error::LiveFeedResult;

/// Upper bound on the close handshake when a session is torn down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle states of a `ConnectionManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Initial state; nothing has been opened yet.
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// The transport is open and frames are flowing.
    Connected,
    /// The last session ended unexpectedly; a retry may be pending.
    Reconnecting,
    /// Terminal: torn down explicitly or out of retries.
    Closed,
}

impl ConnectionState {
    /// Whether `connect()` is allowed from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Closed)
    }
}

struct Inner {
    state: ConnectionState,
    attempts: u32,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    target: String,
    connector: Arc<dyn Connector>,
    policy: Arc<dyn ReconnectPolicy>,
    dispatcher: MessageDispatcher,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            log::debug!("Live feed {}: {:?} -> {:?}", self.target, inner.state, state);
        }
        inner.state = state;
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Moves to `state` unless this session has been cancelled.
    fn transition(&self, token: &CancellationToken, state: ConnectionState) -> bool {
        let mut inner = self.lock();
        if token.is_cancelled() {
            return false;
        }
        self.publish(&mut inner, state);
        true
    }

    fn mark_connected(&self, token: &CancellationToken, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut inner = self.lock();
        if token.is_cancelled() {
            return false;
        }
        inner.attempts = 0;
        inner.outbound = Some(outbound);
        self.publish(&mut inner, ConnectionState::Connected);
        true
    }

    fn clear_outbound(&self) {
        self.lock().outbound = None;
    }

    async fn run_session(self: Arc<Self>, token: CancellationToken, previous: Option<JoinHandle<()>>) {
        // A reconnect after disconnect() must not overlap the old transport.
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        loop {
            if !self.transition(&token, ConnectionState::Connecting) {
                return;
            }

            let opened = tokio::select! {
                _ = token.cancelled() => return,
                opened = self.connector.open(&self.target) => opened,
            };

            match opened {
                Ok(io) => {
                    self.run_connected(&token, io).await;
                    if token.is_cancelled() {
                        return;
                    }
                }
                Err(e) => log::warn!("Failed to connect to {}: {}", self.target, e),
            }

            if !self.transition(&token, ConnectionState::Reconnecting) {
                return;
            }

            let (decision, attempt) = {
                let mut inner = self.lock();
                let decision = self.policy.decide(inner.attempts);
                if decision.should_retry {
                    inner.attempts += 1;
                }
                (decision, inner.attempts)
            };

            if !decision.should_retry {
                log::error!("Live feed {} unavailable: reconnect attempts exhausted.", self.target);
                self.transition(&token, ConnectionState::Closed);
                return;
            }

            log::info!(
                "Reconnecting to {} in {:?} (attempt {}).",
                self.target,
                decision.delay,
                attempt
            );

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(decision.delay) => {}
            }
        }
    }

    async fn run_connected(&self, token: &CancellationToken, io: TransportIo) {
        let TransportIo { mut sink, mut stream } = io;
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        if !self.mark_connected(token, tx) {
            close_transport(&self.target, &mut sink).await;
            return;
        }
        log::info!("Connected to live feed {}", self.target);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::info!("Closing live feed connection to {}", self.target);
                    close_transport(&self.target, &mut sink).await;
                    break;
                }
                Some(text) = rx.recv() => {
                    // A stalled peer must not keep a cancelled session alive.
                    let written = tokio::select! {
                        _ = token.cancelled() => None,
                        written = sink.send(text) => Some(written),
                    };
                    match written {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            log::warn!("Write to {} failed: {}", self.target, e);
                            break;
                        }
                        None => {
                            log::info!("Closing live feed connection to {}", self.target);
                            close_transport(&self.target, &mut sink).await;
                            break;
                        }
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(text)) => {
                            self.dispatcher.dispatch(&text);
                        }
                        Some(Err(e)) => {
                            log::warn!("Transport error on {}: {}", self.target, e);
                            break;
                        }
                        None => {
                            log::warn!("Live feed {} closed by remote host.", self.target);
                            break;
                        }
                    }
                }
            }
        }

        self.clear_outbound();
    }
}

/// Closes `sink`, giving up after `CLOSE_TIMEOUT`.
async fn close_transport(target: &str, sink: &mut TransportSink) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("Error while closing transport to {}: {}", target, e),
        Err(_) => log::warn!("Closing transport to {} timed out; dropping it.", target),
    }
}

/// # Connection Manager
///
/// One explicitly owned live-update client. Construct it where the consuming
/// view is built, hand out references (or an `Arc`) to whoever needs to
/// subscribe, and drop it (or call `disconnect()`) when the view goes away.
///
/// `connect`, `send` and `disconnect` never block and never fail: transport
/// trouble is handled by reconnection and is visible only through
/// [`state`](Self::state) and [`watch_state`](Self::watch_state).
///
/// Methods that start the session must be called from within a Tokio runtime.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    registry: Arc<SubscriptionRegistry>,
}

impl ConnectionManager {
    /// Creates a manager with a fresh `SubscriptionRegistry`.
    pub fn new(
        target: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Self {
        Self::with_registry(target, connector, policy, Arc::new(SubscriptionRegistry::new()))
    }

    /// Creates a manager dispatching into an existing registry.
    pub fn with_registry(
        target: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: Arc<dyn ReconnectPolicy>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Shared {
            target: target.into(),
            connector,
            policy,
            dispatcher: MessageDispatcher::new(Arc::clone(&registry)),
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                attempts: 0,
                token: None,
                task: None,
                outbound: None,
            }),
            state_tx,
        };
        Self { shared: Arc::new(shared), registry }
    }

    /// Creates a WebSocket manager from a validated configuration.
    #[cfg(feature = "ws")]
    pub fn from_config(config: &LiveClientConfig) -> LiveFeedResult<Self> {
        let target = config.target_url()?;
        let policy = config.build_policy()?;
        Ok(Self::new(target.as_str(), Arc::new(crate::ingestors::WsConnector::new()), policy))
    }

    /// # Connect
    ///
    /// Starts a session if the manager is `Disconnected` or `Closed`. From any
    /// other state this is a no-op, so a second transport is never opened.
    ///
    /// # Returns
    /// `true` if a new session was started.
    pub fn connect(&self) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            log::error!("connect() called outside of a Tokio runtime; ignoring.");
            return false;
        };

        let mut inner = self.shared.lock();
        if !inner.state.can_connect() {
            log::debug!("connect() ignored in state {:?}", inner.state);
            return false;
        }

        let token = CancellationToken::new();
        inner.attempts = 0;
        inner.token = Some(token.clone());
        self.shared.publish(&mut inner, ConnectionState::Connecting);

        let previous = inner.task.take();
        let shared = Arc::clone(&self.shared);
        inner.task = Some(runtime.spawn(shared.run_session(token, previous)));
        true
    }

    /// # Send
    ///
    /// Serializes `message` as JSON and queues it on the live transport. Only
    /// effective while `Connected`; otherwise the message is dropped silently.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        let Some(outbound) = self.live_outbound() else {
            log::debug!("send() while not connected; message dropped.");
            return;
        };
        match serde_json::to_string(message) {
            Ok(text) => {
                if outbound.send(text).is_err() {
                    log::debug!("Session ended before the message was queued; dropped.");
                }
            }
            Err(e) => log::warn!("Failed to serialize outbound message: {}", e),
        }
    }

    /// Sends an already serialized text frame. Same delivery rules as `send`.
    pub fn send_text(&self, text: impl Into<String>) {
        match self.live_outbound() {
            Some(outbound) => {
                let _ = outbound.send(text.into());
            }
            None => log::debug!("send_text() while not connected; message dropped."),
        }
    }

    fn live_outbound(&self) -> Option<mpsc::UnboundedSender<String>> {
        let inner = self.shared.lock();
        if inner.state != ConnectionState::Connected {
            return None;
        }
        inner.outbound.clone()
    }

    /// # Disconnect
    ///
    /// Cancels any pending reconnect, closes the transport if open and moves to
    /// `Closed`. Idempotent.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        if inner.state == ConnectionState::Closed {
            return;
        }
        if let Some(token) = inner.token.take() {
            token.cancel();
        }
        inner.outbound = None;
        self.shared.publish(&mut inner, ConnectionState::Closed);
        log::info!("Live feed {} disconnected.", self.shared.target);
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// A receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Reconnect attempts scheduled since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    /// The target address.
    pub fn target(&self) -> &str {
        &self.shared.target
    }

    /// The registry handlers are looked up in.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Registers `handler` for `event_type`, replacing any previous one.
    pub fn subscribe<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.subscribe(event_type, handler);
    }

    /// Registers a handler receiving the payload deserialized as `T`.
    pub fn subscribe_typed<T, F>(&self, event_type: &str, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.subscribe_typed(event_type, handler);
    }

    /// Registers a handler receiving the typed `LiveEvent` for `kind`.
    pub fn subscribe_kind<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(LiveEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.subscribe_kind(kind, handler);
    }

    /// Removes the handler for `event_type`, if any.
    pub fn unsubscribe(&self, event_type: &str) -> bool {
        self.registry.unsubscribe(event_type)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ConnectionManager")
            .field("target", &self.shared.target)
            .field("state", &inner.state)
            .field("attempts", &inner.attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reconnect::FixedIntervalPolicy;
    use crate::error::LiveFeedError;
    use futures_util::future::{self, BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Refusing {
        opens: AtomicUsize,
    }

    impl Connector for Refusing {
        fn open(&self, _target: &str) -> BoxFuture<'static, Result<TransportIo, LiveFeedError>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            future::ready(Err(LiveFeedError::Transport("connection refused".into()))).boxed()
        }
    }

    fn manager(max_attempts: u32) -> (ConnectionManager, Arc<Refusing>) {
        let connector = Arc::new(Refusing { opens: AtomicUsize::new(0) });
        let policy = Arc::new(FixedIntervalPolicy::new(max_attempts, Duration::from_secs(5)));
        let manager = ConnectionManager::new("ws://test.invalid/ws", connector.clone(), policy);
        (manager, connector)
    }

    #[test]
    fn starts_disconnected_and_connect_needs_a_runtime() {
        let (manager, connector) = manager(1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.connect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disconnect_is_idempotent_without_a_session() {
        let (manager, _) = manager(1);
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[test]
    fn send_while_disconnected_is_a_no_op() {
        let (manager, _) = manager(1);
        manager.send(&serde_json::json!({"action": "ping"}));
        manager.send_text("raw");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_ends_closed() {
        let (manager, connector) = manager(2);
        let mut states = manager.watch_state();

        assert!(manager.connect());
        states.wait_for(|s| *s == ConnectionState::Closed).await.unwrap();

        // Initial open plus two retries.
        assert_eq!(connector.opens.load(Ordering::SeqCst), 3);
        assert_eq!(manager.attempts(), 2);
    }

    #[test]
    fn connectable_states() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(ConnectionState::Closed.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Connected.can_connect());
        assert!(!ConnectionState::Reconnecting.can_connect());
    }
}
