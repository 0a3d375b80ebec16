//! Patch/session hub: live connections, session bookkeeping and broadcast.
//!
//! # Connections
//!
//! Each open socket is registered with [`Hub::run_connection`], which owns
//! the receive loop and spawns a heartbeat task for it:
//!
//! ```text
//! Connecting ──open──▶ Open ──inbound ends / liveness timeout──▶ Closing ──▶ Closed
//! ```
//!
//! The heartbeat pings on a fixed interval, refreshes the session, and
//! closes the socket when no pong arrived within the liveness timeout.
//!
//! # Sessions
//!
//! A session is refreshed by every request and every heartbeat. It holds
//! the clear callbacks registered by [`Hub::patch`]; the client reports a
//! vanished target with an `invalid` frame and the callback runs once. The
//! sweeper evicts sessions idle for longer than the staleness window,
//! independent of any open connection.
//!
//! # Locking
//!
//! Sessions and connections sit behind separate locks and no method holds
//! both. Callbacks and socket writes run with no lock held.

use futures::{FutureExt, Stream, StreamExt, future::BoxFuture, future::join_all};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tether_core::{BoxError, ElementNode, HubError, PatchOperation, Swap};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::registry::panic_message;

/// Fixed timing policy of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Interval between application-level pings.
    pub ping_interval: Duration,
    /// A connection with no pong for this long is closed.
    pub liveness_timeout: Duration,
    /// Interval between session sweeps.
    pub sweep_interval: Duration,
    /// A session idle for longer than this is evicted.
    pub staleness: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::with_ping_interval(Duration::from_secs(25))
    }
}

impl HubConfig {
    /// Defaults, with the liveness timeout at three ping intervals.
    pub fn with_ping_interval(ping_interval: Duration) -> Self {
        Self {
            ping_interval,
            liveness_timeout: ping_interval * 3,
            sweep_interval: Duration::from_secs(30),
            staleness: Duration::from_secs(60),
        }
    }
}

/// Opaque session identifier carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    /// The id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Registered, session not yet resolved.
    Connecting,
    /// Receiving frames.
    Open,
    /// Receive loop has exited; heartbeat is being torn down.
    Closing,
    /// Gone.
    Closed,
}

/// Runs when the client reports a pushed target no longer exists.
pub type ClearCallback = Box<dyn FnOnce() + Send + 'static>;

/// A socket frame. Frames are JSON objects tagged by `type`, one per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Liveness check.
    Ping,
    /// Liveness reply.
    Pong,
    /// Operations to apply in order.
    Patch {
        /// The operations.
        ops: Vec<PatchOperation>,
    },
    /// The client no longer has an element with this id.
    Invalid {
        /// Element id.
        id: String,
    },
}

impl Frame {
    /// Newline-terminated wire form.
    pub fn encode(&self) -> Result<String, HubError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode every frame in a newline-delimited message.
    ///
    /// Lines that fail to decode are logged and skipped.
    pub fn decode_all(text: &str) -> Vec<Frame> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(frame) => Some(frame),
                Err(error) => {
                    debug!(%error, "ignoring undecodable frame");
                    None
                }
            })
            .collect()
    }
}

/// The writing half of a connection.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot carry hub frames",
    note = "Implement `FrameSink` for the writing half of your socket."
)]
pub trait FrameSink: Send + Sync + 'static {
    /// Write one encoded frame.
    fn send(&self, frame: Arc<str>) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Close the socket. Must be idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Object-safe version of [`FrameSink`].
pub trait DynFrameSink: Send + Sync + 'static {
    /// Write one encoded frame (dynamic dispatch version).
    fn send_dyn(&self, frame: Arc<str>) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Close the socket (dynamic dispatch version).
    fn close_dyn(&self) -> BoxFuture<'_, ()>;
}

impl<S: FrameSink> DynFrameSink for S {
    fn send_dyn(&self, frame: Arc<str>) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(self.send(frame))
    }

    fn close_dyn(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.close())
    }
}

/// A shared, type-erased sink.
pub type SharedSink = Arc<dyn DynFrameSink>;

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Connections the frame was written to.
    pub delivered: usize,
    /// Connections whose write failed or panicked.
    pub failed: usize,
}

struct SessionRecord {
    last_seen: Instant,
    targets: HashMap<String, ClearCallback>,
}

impl SessionRecord {
    fn new(now: Instant) -> Self {
        Self {
            last_seen: now,
            targets: HashMap::new(),
        }
    }
}

struct Connection {
    session: SessionId,
    sink: SharedSink,
    last_pong: Mutex<Instant>,
    state: Mutex<ConnState>,
}

impl Connection {
    fn set_state(&self, state: ConnState) {
        *lock(&self.state) = state;
    }

    fn state(&self) -> ConnState {
        *lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owner of live connections and per-session state.
pub struct Hub {
    config: HubConfig,
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    /// A hub with the given timing policy.
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The timing policy.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Create or refresh a session.
    pub fn touch(&self, session: &SessionId) {
        let now = Instant::now();
        lock(&self.sessions)
            .entry(session.clone())
            .and_modify(|record| record.last_seen = now)
            .or_insert_with(|| SessionRecord::new(now));
    }

    /// Whether a session record exists.
    pub fn has_session(&self, session: &SessionId) -> bool {
        lock(&self.sessions).contains_key(session)
    }

    /// Number of session records.
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Remember `callback` until the client reports `target` gone.
    ///
    /// A callback already registered for the same target is dropped
    /// without running.
    pub fn register_clear(&self, session: &SessionId, target: &str, callback: ClearCallback) {
        let now = Instant::now();
        let mut sessions = lock(&self.sessions);
        let record = sessions
            .entry(session.clone())
            .or_insert_with(|| SessionRecord::new(now));
        record.last_seen = now;
        record.targets.insert(target.to_string(), callback);
    }

    /// Run and forget the clear callback for `target`, if any.
    ///
    /// Returns whether a callback ran. A panicking callback is logged and
    /// swallowed.
    pub fn invalidate(&self, session: &SessionId, target: &str) -> bool {
        let callback = lock(&self.sessions)
            .get_mut(session)
            .and_then(|record| record.targets.remove(target));
        let Some(callback) = callback else {
            debug!(%session, target, "no clear callback registered");
            return false;
        };
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
            warn!(
                %session,
                target,
                panic = %panic_message(payload.as_ref()),
                "clear callback panicked"
            );
        }
        true
    }

    /// Evict sessions idle for longer than the staleness window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`Hub::sweep`] against an explicit clock reading.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let staleness = self.config.staleness;
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, record| now.saturating_duration_since(record.last_seen) <= staleness);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "swept stale sessions");
        }
        evicted
    }

    /// Sweep on the configured interval until the hub is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let hub: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.sweep();
            }
        })
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Register a connection for `session`.
    pub fn open<S: FrameSink>(&self, session: SessionId, sink: S) -> ConnectionId {
        self.open_shared(session, Arc::new(sink))
    }

    /// [`Hub::open`] for an already shared sink.
    pub fn open_shared(&self, session: SessionId, sink: SharedSink) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(Connection {
            session: session.clone(),
            sink,
            last_pong: Mutex::new(Instant::now()),
            state: Mutex::new(ConnState::Connecting),
        });
        self.connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, connection.clone());
        self.touch(&session);
        connection.set_state(ConnState::Open);
        info!(connection = %id, %session, "connection opened");
        id
    }

    /// Forget a connection and close its socket.
    pub async fn close(&self, id: ConnectionId) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        if let Some(connection) = removed {
            connection.set_state(ConnState::Closing);
            connection.sink.close_dyn().await;
            connection.set_state(ConnState::Closed);
            info!(connection = %id, session = %connection.session, "connection closed");
        }
    }

    /// Current state of a connection; unknown ids are closed.
    pub fn state(&self, id: ConnectionId) -> ConnState {
        self.connection(id)
            .map_or(ConnState::Closed, |connection| connection.state())
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Process one inbound message, which may hold several frames.
    pub async fn handle_frame(&self, id: ConnectionId, text: &str) -> Result<(), HubError> {
        let connection = self
            .connection(id)
            .ok_or(HubError::ConnectionClosed(id.0))?;
        for frame in Frame::decode_all(text) {
            match frame {
                Frame::Ping => {
                    let pong: Arc<str> = Frame::Pong.encode()?.into();
                    connection.sink.send_dyn(pong).await.map_err(HubError::Send)?;
                }
                Frame::Pong => {
                    *lock(&connection.last_pong) = Instant::now();
                    self.touch(&connection.session);
                }
                Frame::Invalid { id: target } => {
                    self.invalidate(&connection.session, &target);
                }
                Frame::Patch { .. } => {
                    debug!(connection = %id, "ignoring patch frame from client");
                }
            }
        }
        Ok(())
    }

    /// Heartbeat for one connection; returns when stopped or timed out.
    async fn heartbeat(self: Arc<Self>, id: ConnectionId, mut stop: watch::Receiver<bool>) {
        let period = self.config.ping_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping: Arc<str> = match Frame::Ping.encode() {
            Ok(line) => line.into(),
            Err(error) => {
                warn!(%error, "cannot encode ping");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            let Some(connection) = self.connection(id) else {
                break;
            };
            let silent = lock(&connection.last_pong).elapsed();
            if silent > self.config.liveness_timeout {
                warn!(connection = %id, ?silent, "no pong received, closing");
                connection.sink.close_dyn().await;
                break;
            }
            self.touch(&connection.session);
            if let Err(error) = connection.sink.send_dyn(ping.clone()).await {
                debug!(connection = %id, %error, "ping failed");
                break;
            }
        }
    }

    /// Serve one connection until its inbound stream ends or the heartbeat
    /// gives up. The connection is closed and forgotten on return.
    pub async fn run_connection<S, I, E>(self: &Arc<Self>, session: SessionId, sink: S, inbound: I)
    where
        S: FrameSink,
        I: Stream<Item = Result<String, E>> + Send,
        E: fmt::Display + Send,
    {
        let id = self.open(session, sink);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut heartbeat = tokio::spawn(self.clone().heartbeat(id, stop_rx));
        let mut inbound = std::pin::pin!(inbound);

        loop {
            tokio::select! {
                message = inbound.next() => match message {
                    Some(Ok(text)) => {
                        if let Err(error) = self.handle_frame(id, &text).await {
                            debug!(connection = %id, %error, "frame handling failed");
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        debug!(connection = %id, %error, "receive failed");
                        break;
                    }
                    None => break,
                },
                _ = &mut heartbeat => break,
            }
        }

        if let Some(connection) = self.connection(id) {
            connection.set_state(ConnState::Closing);
        }
        let _ = stop_tx.send(true);
        self.close(id).await;
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Send operations to every open connection.
    ///
    /// The frame is encoded once. Each write is isolated: a failing or
    /// panicking sink is logged, counted and its connection closed; the
    /// others still receive the frame.
    pub async fn push(&self, ops: Vec<PatchOperation>) -> Result<PushReport, HubError> {
        let frame: Arc<str> = Frame::Patch { ops }.encode()?.into();
        let targets: Vec<(ConnectionId, SharedSink)> = self
            .connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(_, connection)| connection.state() == ConnState::Open)
            .map(|(id, connection)| (*id, connection.sink.clone()))
            .collect();

        let sends = targets.into_iter().map(|(id, sink)| {
            let frame = frame.clone();
            async move {
                let outcome = AssertUnwindSafe(async move { sink.send_dyn(frame).await })
                    .catch_unwind()
                    .await;
                let delivered = match outcome {
                    Ok(Ok(())) => true,
                    Ok(Err(error)) => {
                        warn!(connection = %id, %error, "broadcast send failed");
                        false
                    }
                    Err(payload) => {
                        warn!(
                            connection = %id,
                            panic = %panic_message(payload.as_ref()),
                            "broadcast send panicked"
                        );
                        false
                    }
                };
                (id, delivered)
            }
        });

        let mut report = PushReport::default();
        let mut dead = Vec::new();
        for (id, delivered) in join_all(sends).await {
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
                dead.push(id);
            }
        }
        for id in dead {
            self.close(id).await;
        }
        Ok(report)
    }

    /// Push one element tree to `target`, first remembering `on_clear`
    /// under the session.
    pub async fn patch(
        &self,
        session: &SessionId,
        swap: Swap,
        target: &str,
        element: ElementNode,
        on_clear: Option<ClearCallback>,
    ) -> Result<PushReport, HubError> {
        if let Some(callback) = on_clear {
            self.register_clear(session, target, callback);
        }
        self.push(vec![PatchOperation::swap(swap, target, element)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSink, PanickingSink, RecordingSink};
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, ClearCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_frame_wire_format() {
        assert_eq!(Frame::Ping.encode().unwrap(), "{\"type\":\"ping\"}\n");
        assert_eq!(
            Frame::decode_all("{\"type\":\"pong\"}\n{\"type\":\"invalid\",\"id\":\"t1\"}\nnot json"),
            vec![Frame::Pong, Frame::Invalid { id: "t1".into() }]
        );
        let patch = Frame::Patch {
            ops: vec![PatchOperation::Reload],
        };
        assert_eq!(
            patch.encode().unwrap(),
            "{\"type\":\"patch\",\"ops\":[{\"op\":\"reload\"}]}\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_stale_sessions() {
        let hub = Hub::default();
        let stale = SessionId::new("stale");
        let fresh = SessionId::new("fresh");
        hub.touch(&stale);
        hub.touch(&fresh);

        tokio::time::advance(Duration::from_secs(59)).await;
        hub.touch(&fresh);
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(hub.sweep(), 1);
        assert!(!hub.has_session(&stale));
        assert!(hub.has_session(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_interval() {
        let hub = Arc::new(Hub::default());
        let session = SessionId::new("s");
        hub.touch(&session);
        let sweeper = hub.spawn_sweeper();

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert!(!hub.has_session(&session));

        drop(hub);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_ignores_open_connections_of_other_sessions() {
        let hub = Hub::default();
        let idle = SessionId::new("idle");
        hub.touch(&idle);
        let id = hub.open(SessionId::new("live"), RecordingSink::new());

        tokio::time::advance(Duration::from_secs(120)).await;
        hub.touch(&SessionId::new("live"));
        hub.sweep();

        assert!(!hub.has_session(&idle));
        assert_eq!(hub.state(id), ConnState::Open);
    }

    #[tokio::test]
    async fn test_broadcast_survives_failing_sink() {
        let hub = Hub::default();
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        hub.open(SessionId::new("a"), first.clone());
        let broken = hub.open(SessionId::new("b"), FailingSink);
        hub.open(SessionId::new("c"), second.clone());

        let report = hub.push(vec![PatchOperation::title("hi")]).await.unwrap();
        assert_eq!(report, PushReport {
            delivered: 2,
            failed: 1
        });
        for sink in [first, second] {
            let frames = sink.frames();
            assert_eq!(frames.len(), 1);
            assert!(frames[0].starts_with("{\"type\":\"patch\""));
        }
        assert_eq!(hub.state(broken), ConnState::Closed);
        assert_eq!(hub.connection_count(), 2);

        let report = hub.push(vec![PatchOperation::Reload]).await.unwrap();
        assert_eq!(report, PushReport {
            delivered: 2,
            failed: 0
        });
    }

    #[tokio::test]
    async fn test_broadcast_survives_panicking_sink() {
        let hub = Hub::default();
        let sink = RecordingSink::new();
        hub.open(SessionId::new("a"), PanickingSink);
        hub.open(SessionId::new("b"), sink.clone());

        let report = hub.push(vec![PatchOperation::Reload]).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_without_callback_is_noop() {
        let hub = Hub::default();
        let sink = RecordingSink::new();
        let id = hub.open(SessionId::new("s"), sink.clone());

        hub.handle_frame(id, "{\"type\":\"invalid\",\"id\":\"gone\"}")
            .await
            .unwrap();
        assert_eq!(hub.state(id), ConnState::Open);
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_clear_callback_runs_once() {
        let hub = Hub::default();
        let session = SessionId::new("s");
        let id = hub.open(session.clone(), RecordingSink::new());
        let (count, callback) = counter();

        let report = hub
            .patch(&session, Swap::Inline, "clock", ElementNode::new("span"), Some(callback))
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);

        let invalid = "{\"type\":\"invalid\",\"id\":\"clock\"}\n";
        hub.handle_frame(id, invalid).await.unwrap();
        hub.handle_frame(id, invalid).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_is_swallowed() {
        let hub = Hub::default();
        let session = SessionId::new("s");
        let sink = RecordingSink::new();
        let id = hub.open(session.clone(), sink.clone());
        hub.register_clear(&session, "bad", Box::new(|| panic!("callback blew up")));
        let (count, callback) = counter();
        hub.register_clear(&session, "good", callback);

        hub.handle_frame(
            id,
            "{\"type\":\"invalid\",\"id\":\"bad\"}\n{\"type\":\"invalid\",\"id\":\"good\"}\n{\"type\":\"ping\"}",
        )
        .await
        .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sink.frames(), vec!["{\"type\":\"pong\"}\n".to_string()]);
    }

    #[tokio::test]
    async fn test_callbacks_are_per_session() {
        let hub = Hub::default();
        let (count, callback) = counter();
        hub.register_clear(&SessionId::new("a"), "t", callback);

        assert!(!hub.invalidate(&SessionId::new("b"), "t"));
        assert!(hub.invalidate(&SessionId::new("a"), "t"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_is_not_pushed_to() {
        let hub = Hub::default();
        let sink = RecordingSink::new();
        let id = hub.open(SessionId::new("s"), sink.clone());
        hub.close(id).await;

        assert_eq!(hub.state(id), ConnState::Closed);
        assert!(sink.is_closed());
        let report = hub.push(vec![PatchOperation::Reload]).await.unwrap();
        assert_eq!(report, PushReport::default());
        assert!(matches!(
            hub.handle_frame(id, "{\"type\":\"ping\"}").await,
            Err(HubError::ConnectionClosed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_closes_silent_connection() {
        let hub = Arc::new(Hub::default());
        let sink = RecordingSink::new();
        let inbound = futures::stream::pending::<Result<String, std::convert::Infallible>>();

        hub.run_connection(SessionId::new("s"), sink.clone(), inbound)
            .await;

        assert!(sink.is_closed());
        assert_eq!(hub.connection_count(), 0);
        let pings = sink
            .frames()
            .iter()
            .filter(|frame| frame.as_str() == "{\"type\":\"ping\"}\n")
            .count();
        assert_eq!(pings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_connection_alive() {
        let hub = Arc::new(Hub::default());
        let sink = RecordingSink::new();
        let session = SessionId::new("s");
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<String, String>>();

        let task = tokio::spawn({
            let hub = hub.clone();
            let sink = sink.clone();
            let session = session.clone();
            async move { hub.run_connection(session, sink, rx).await }
        });

        for _ in 0..8 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            tx.unbounded_send(Ok("{\"type\":\"pong\"}".into())).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(hub.connection_count(), 1);
        assert!(!sink.is_closed());
        assert_eq!(hub.sweep(), 0);
        assert!(hub.has_session(&session));

        drop(tx);
        task.await.unwrap();
        assert_eq!(hub.connection_count(), 0);
        assert!(sink.is_closed());
    }
}
