use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use std::time::Instant;

use autometrics::autometrics;
use bytes::Bytes;
use parking_lot::RwLock;
use parking_lot::RwLockWriteGuard;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

use super::KeeperState;
use crate::config::KeeperConfig;
use crate::metrics::init_metrics;
use crate::metrics::EXPIRED_SESSIONS;
use crate::metrics::MULTI_BATCH_SIZE;
use crate::metrics::OPERATION_COUNTER;
use crate::session::SessionExpiry;
use crate::session::SessionId;
use crate::session::SessionLivenessMonitor;
use crate::session::SessionState;
use crate::tree::CreateMode;
use crate::tree::Stat;
use crate::txn::OpResult;
use crate::txn::Operation;
use crate::watch::ChannelNotifier;
use crate::watch::NotificationDispatcher;
use crate::watch::ReleaseWatcher;
use crate::watch::WatchDispatcher;
use crate::watch::WatchMode;
use crate::watch::WatcherHandle;
use crate::watch::WatcherId;
use crate::Error;
use crate::KeeperError;
use crate::Result;
use crate::SystemError;
use crate::API_SLO;

pub(crate) struct KeeperInner {
    /// The serialization point: mutations take the write side, reads the
    /// read side.
    state: RwLock<KeeperState>,

    dispatcher: WatchDispatcher,

    /// Set when the built-in channel notifier is in use
    channels: Option<Arc<ChannelNotifier>>,

    shutdown: AtomicBool,
    config: KeeperConfig,
}

impl KeeperInner {
    fn disconnect_watcher(
        &self,
        watcher_id: WatcherId,
    ) -> bool {
        let removed = self.state.write().disconnect_watcher(watcher_id);
        if self.shutdown.load(Ordering::Acquire) {
            // the dispatcher thread is gone; forward the disconnect here
            self.dispatcher.flush_stopped();
        }
        removed
    }
}

impl ReleaseWatcher for KeeperInner {
    fn release_watcher(
        &self,
        watcher_id: WatcherId,
    ) {
        self.disconnect_watcher(watcher_id);
    }
}

/// Shared handle to one coordination kernel.
///
/// Cloning is cheap; every clone talks to the same tree, session table and
/// watch registry. All methods are synchronous: the critical sections are
/// short and never await.
#[derive(Clone)]
pub struct Keeper {
    inner: Arc<KeeperInner>,
}

impl std::fmt::Debug for Keeper {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Keeper")
            .field("last_zxid", &self.last_zxid())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Acquire))
            .field("dispatching", &self.inner.dispatcher.is_running())
            .finish()
    }
}

impl Keeper {
    /// Start a kernel that delivers watch events over per-watcher channels
    /// (see [`Keeper::connect_watcher`]).
    pub fn new(config: KeeperConfig) -> Result<Self> {
        let channels = Arc::new(ChannelNotifier::new());
        Self::build(config, channels.clone(), Some(channels))
    }

    /// Start a kernel that hands every watch event to `dispatcher`.
    pub fn with_dispatcher(
        config: KeeperConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self> {
        Self::build(config, dispatcher, None)
    }

    fn build(
        config: KeeperConfig,
        notifier: Arc<dyn NotificationDispatcher>,
        channels: Option<Arc<ChannelNotifier>>,
    ) -> Result<Self> {
        let config = config.validate()?;
        init_metrics();

        let (dispatcher, queue) = WatchDispatcher::new(notifier, config.watch.dispatch_batch_size);
        dispatcher.start()?;

        let state = KeeperState::new(&config, queue);
        info!(server_id = config.kernel.server_id, "Keeper started");

        Ok(Self {
            inner: Arc::new(KeeperInner {
                state: RwLock::new(state),
                dispatcher,
                channels,
                shutdown: AtomicBool::new(false),
                config,
            }),
        })
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.inner.config
    }

    /// Exclusive side of the serialization point; refused after shutdown.
    fn write_state(&self) -> Result<RwLockWriteGuard<'_, KeeperState>> {
        let state = self.inner.state.write();
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(SystemError::KernelShutdown.into());
        }
        Ok(state)
    }

    // -
    // Sessions

    /// Open a CONNECTED session; `None` asks for the maximum timeout.
    #[autometrics(objective = API_SLO)]
    pub fn create_session(
        &self,
        requested_timeout: Option<Duration>,
    ) -> Result<(SessionId, Duration)> {
        let mut state = self.write_state()?;
        let created = state.sessions_mut().create_session(requested_timeout, Instant::now());
        state.update_gauges();
        Ok(created)
    }

    /// Heartbeat: push the session deadline out by its timeout.
    pub fn touch_session(
        &self,
        session_id: SessionId,
    ) -> Result<()> {
        self.write_state()?.sessions_mut().touch(session_id, Instant::now())?;
        Ok(())
    }

    /// Liveness collaborator: the session missed its deadline.
    #[autometrics(objective = API_SLO)]
    pub fn on_session_timeout(
        &self,
        session_id: SessionId,
    ) -> Result<()> {
        expire_session(&mut *self.write_state()?, session_id)
    }

    /// Connection collaborator: the client closed its session.
    #[autometrics(objective = API_SLO)]
    pub fn on_session_close(
        &self,
        session_id: SessionId,
    ) -> Result<()> {
        self.write_state()?.terminate_session(session_id, SessionState::Closed)?;
        Ok(())
    }

    /// `None` once the session is unknown or its tombstone was evicted.
    pub fn session_state(
        &self,
        session_id: SessionId,
    ) -> Option<SessionState> {
        self.inner.state.read().sessions().state(session_id)
    }

    /// Live sessions whose deadline has passed.
    pub fn expired_sessions(&self) -> Vec<SessionId> {
        self.inner.state.read().sessions().expired_sessions(Instant::now())
    }

    /// Spawn the background task that expires timed-out sessions every
    /// `session.tick_interval_ms`. Must be called inside a tokio runtime.
    pub fn start_liveness_monitor(
        &self,
        shutdown_signal: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        SessionLivenessMonitor::spawn(
            Arc::new(self.clone()),
            self.inner.config.session.tick_interval(),
            shutdown_signal,
        )
    }

    // -
    // Operations

    /// Apply one operation as its own transaction.
    #[autometrics(objective = API_SLO)]
    pub fn submit_operation(
        &self,
        session_id: SessionId,
        op: Operation,
    ) -> Result<OpResult> {
        let result = self.write_state()?.submit(session_id, &op);
        let outcome = if result.is_ok() { "ok" } else { "error" };
        OPERATION_COUNTER.with_label_values(&[op.kind(), outcome]).inc();
        Ok(result?)
    }

    /// Apply a batch atomically: either every op commits or none does.
    #[autometrics(objective = API_SLO)]
    pub fn submit_multi(
        &self,
        session_id: SessionId,
        ops: Vec<Operation>,
    ) -> Result<Vec<OpResult>> {
        let result = self.write_state()?.multi(session_id, &ops);
        let outcome = if result.is_ok() { "ok" } else { "error" };
        MULTI_BATCH_SIZE.with_label_values(&[outcome]).observe(ops.len() as f64);
        OPERATION_COUNTER.with_label_values(&["multi", outcome]).inc();
        if let Err(e) = &result {
            debug!(session_id = %session_id, ops = ops.len(), error = %e, "Multi rejected");
        }
        result
    }

    /// Returns the actual path (with sequential suffix) and the new Stat.
    pub fn create(
        &self,
        session_id: SessionId,
        path: &str,
        data: impl Into<Bytes>,
        mode: CreateMode,
    ) -> Result<(String, Stat)> {
        match self.submit_operation(session_id, Operation::create(path, data, mode))? {
            OpResult::Create { path, stat } => Ok((path, stat)),
            other => Err(unexpected(other)),
        }
    }

    pub fn set_data(
        &self,
        session_id: SessionId,
        path: &str,
        data: impl Into<Bytes>,
        version: i32,
    ) -> Result<Stat> {
        match self.submit_operation(session_id, Operation::set_data(path, data, version))? {
            OpResult::SetData { stat } => Ok(stat),
            other => Err(unexpected(other)),
        }
    }

    pub fn delete(
        &self,
        session_id: SessionId,
        path: &str,
        version: i32,
    ) -> Result<()> {
        self.submit_operation(session_id, Operation::delete(path, version))?;
        Ok(())
    }

    // -
    // Reads

    #[autometrics(objective = API_SLO)]
    pub fn exists(
        &self,
        path: &str,
    ) -> Result<Option<Stat>> {
        Ok(self.inner.state.read().exists(path)?)
    }

    #[autometrics(objective = API_SLO)]
    pub fn get_data(
        &self,
        path: &str,
    ) -> Result<(Bytes, Stat)> {
        Ok(self.inner.state.read().get_data(path)?)
    }

    #[autometrics(objective = API_SLO)]
    pub fn get_children(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat)> {
        Ok(self.inner.state.read().get_children(path)?)
    }

    pub fn last_zxid(&self) -> u64 {
        self.inner.state.read().last_zxid()
    }

    /// Number of znodes, root included.
    pub fn node_count(&self) -> usize {
        self.inner.state.read().node_count()
    }

    // -
    // Watches

    /// Connect a watcher, optionally bound to a session (it is then
    /// disconnected when the session ends).
    ///
    /// With the built-in notifier the handle carries the event receiver;
    /// with a custom [`NotificationDispatcher`] it only carries the id.
    /// Dropping the handle disconnects the watcher.
    #[autometrics(objective = API_SLO)]
    pub fn connect_watcher(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<WatcherHandle> {
        let mut state = self.write_state()?;
        let watcher_id = state.connect_watcher(session_id)?;
        let receiver = self.inner.channels.as_ref().map(|c| c.subscribe(watcher_id));
        drop(state);

        let owner: Weak<dyn ReleaseWatcher> = Arc::downgrade(&self.inner) as Weak<dyn ReleaseWatcher>;
        Ok(WatcherHandle::new(watcher_id, owner, receiver))
    }

    /// Connect a watcher whose lifetime the caller manages through
    /// [`Keeper::on_watcher_disconnect`].
    ///
    /// Only available with a custom [`NotificationDispatcher`]: the built-in
    /// notifier has no way to hand out the receiver, so use
    /// [`Keeper::connect_watcher`] there.
    pub fn register_watcher(
        &self,
        session_id: Option<SessionId>,
    ) -> Result<WatcherId> {
        if self.inner.channels.is_some() {
            return Err(KeeperError::BadArguments(
                "register_watcher requires a custom notification dispatcher; use connect_watcher".into(),
            )
            .into());
        }
        Ok(self.write_state()?.connect_watcher(session_id)?)
    }

    /// Register `(path, watcher, mode)`. Returns `false` when the exact
    /// registration already existed.
    #[autometrics(objective = API_SLO)]
    pub fn add_watch(
        &self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) -> Result<bool> {
        Ok(self.write_state()?.add_watch(path, watcher_id, mode)?)
    }

    pub fn remove_watch(
        &self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) -> Result<()> {
        Ok(self.write_state()?.remove_watch(path, watcher_id, mode)?)
    }

    /// Connection collaborator: the watcher went away. Idempotent.
    pub fn on_watcher_disconnect(
        &self,
        watcher_id: WatcherId,
    ) -> bool {
        self.inner.disconnect_watcher(watcher_id)
    }

    /// Total watch registrations.
    pub fn watch_count(&self) -> usize {
        self.inner.state.read().watches().watch_count()
    }

    // -
    // Lifecycle

    /// Stop accepting requests and flush pending watch events.
    ///
    /// Reads keep working on the final state.
    pub fn shutdown(&self) {
        {
            // in-flight mutations finish and queue their events first
            let _state = self.inner.state.write();
            if self.inner.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.inner.dispatcher.stop();
        info!("Keeper shut down");
    }
}

impl SessionExpiry for Keeper {
    fn expired_sessions(&self) -> Vec<SessionId> {
        Keeper::expired_sessions(self)
    }

    fn expire(
        &self,
        session_id: SessionId,
    ) -> Result<bool> {
        let mut state = self.write_state()?;
        // a heartbeat may have landed between the scan and this lock
        if !state.sessions().is_past_deadline(session_id, Instant::now()) {
            return Ok(false);
        }
        expire_session(&mut state, session_id)?;
        Ok(true)
    }
}

fn expire_session(
    state: &mut KeeperState,
    session_id: SessionId,
) -> Result<()> {
    let was_live = state.sessions().state(session_id) == Some(SessionState::Connected);
    state.terminate_session(session_id, SessionState::Expired)?;
    if was_live {
        EXPIRED_SESSIONS.inc();
    }
    Ok(())
}

fn unexpected(result: OpResult) -> Error {
    Error::Fatal(format!("operation produced mismatched result: {result:?}"))
}
