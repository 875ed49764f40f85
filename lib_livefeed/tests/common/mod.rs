//! Scripted in-memory transport for driving `ConnectionManager` in tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::{sink, stream};
use tokio::sync::mpsc;

use lib_livefeed::{ConnectionManager, ConnectionState, Connector, FixedIntervalPolicy, LiveFeedError, TransportIo};

/// What the next `open` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Refuse,
    Accept,
    /// Opens a transport whose writes and close never complete and which never
    /// delivers a frame.
    Stall,
}

/// The server side of one accepted scripted connection.
pub struct RemoteEnd {
    /// Frames pushed to the client. Dropping it closes the connection.
    pub to_client: mpsc::UnboundedSender<Result<String, LiveFeedError>>,
    /// Messages the client wrote. Yields `None` once the client side is gone.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl RemoteEnd {
    pub fn push(&self, frame: &str) {
        self.to_client.send(Ok(frame.to_string())).expect("client stream dropped");
    }

    /// Collects everything the client wrote until it closed its end.
    pub async fn drain(mut self) -> Vec<String> {
        drop(self.to_client);
        let mut out = Vec::new();
        while let Some(msg) = self.from_client.recv().await {
            out.push(msg);
        }
        out
    }
}

pub struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    opens: AtomicUsize,
    remotes: Mutex<VecDeque<RemoteEnd>>,
}

impl ScriptedConnector {
    /// Plays `script` in order, then repeats `fallback` forever.
    pub fn new(script: &[Step], fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            opens: AtomicUsize::new(0),
            remotes: Mutex::new(VecDeque::new()),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The oldest accepted connection not yet taken by the test.
    pub fn take_remote(&self) -> RemoteEnd {
        self.remotes.lock().unwrap().pop_front().expect("no accepted connection")
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _target: &str) -> BoxFuture<'static, Result<TransportIo, LiveFeedError>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);

        if step == Step::Refuse {
            return future::ready(Err(LiveFeedError::Transport("connection refused".into()))).boxed();
        }

        if step == Step::Stall {
            let sink = sink::unfold((), |(), _msg: String| future::pending::<Result<(), LiveFeedError>>());
            let stream = stream::pending::<Result<String, LiveFeedError>>();
            return future::ready(Ok(TransportIo::new(sink, stream))).boxed();
        }

        let (to_client, inbound) = mpsc::unbounded_channel::<Result<String, LiveFeedError>>();
        let (outbound, from_client) = mpsc::unbounded_channel::<String>();

        let stream = stream::unfold(inbound, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        let sink = sink::unfold(outbound, |tx, msg: String| async move {
            tx.send(msg).map_err(|_| LiveFeedError::Transport("remote gone".into()))?;
            Ok::<_, LiveFeedError>(tx)
        });

        self.remotes.lock().unwrap().push_back(RemoteEnd { to_client, from_client });
        future::ready(Ok(TransportIo::new(sink, stream))).boxed()
    }
}

pub const RETRY_DELAY: Duration = Duration::from_secs(5);

pub fn manager(connector: &Arc<ScriptedConnector>, max_attempts: u32) -> ConnectionManager {
    ConnectionManager::new(
        "ws://scripted.test/ws",
        connector.clone(),
        Arc::new(FixedIntervalPolicy::new(max_attempts, RETRY_DELAY)),
    )
}

pub async fn wait_for(manager: &ConnectionManager, state: ConnectionState) {
    let mut rx = manager.watch_state();
    rx.wait_for(|s| *s == state).await.expect("state channel closed");
}
