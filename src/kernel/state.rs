//! The kernel state machine.
//!
//! [`KeeperState`] bundles the tree, the session table and the watch registry
//! into one plain, single-threaded value. The [`Keeper`](super::Keeper)
//! handle wraps it in the serialization point; every method here assumes the
//! caller already holds the right side of that lock.
//!
//! Each committed mutation is published exactly once: ephemeral ownership is
//! updated from the mutation's pre/post images, watch events are resolved,
//! and the resulting deliveries are pushed onto the outbound queue before
//! the lock is released.

use bytes::Bytes;
use tracing::debug;
use tracing::warn;

use crate::config::KeeperConfig;
use crate::constants::ANY_VERSION;
use crate::metrics::ACTIVE_SESSIONS;
use crate::metrics::REGISTERED_WATCHES;
use crate::session::SessionId;
use crate::session::SessionState;
use crate::session::SessionTracker;
use crate::tree::validate_path;
use crate::tree::Mutation;
use crate::tree::NodeStore;
use crate::tree::Stat;
use crate::tree::Znode;
use crate::txn::OpResult;
use crate::txn::Operation;
use crate::txn::TransactionCoordinator;
use crate::txn::TxnHeader;
use crate::utils::time::timestamp_millis;
use crate::watch::EventQueue;
use crate::watch::EventType;
use crate::watch::Outbound;
use crate::watch::WatchManager;
use crate::watch::WatchMode;
use crate::watch::WatcherId;
use crate::Error;
use crate::KeeperError;

#[derive(Debug)]
pub(crate) struct KeeperState {
    tree: NodeStore,
    sessions: SessionTracker,
    watches: WatchManager,

    /// Zxid of the last committed transaction
    last_zxid: u64,

    outbound: EventQueue,
}

impl KeeperState {
    pub(crate) fn new(
        config: &KeeperConfig,
        outbound: EventQueue,
    ) -> Self {
        Self {
            tree: NodeStore::new(config.tree.max_data_bytes),
            sessions: SessionTracker::new(config.kernel.server_id, timestamp_millis(), config.session.clone()),
            watches: WatchManager::new(config.watch.clone()),
            last_zxid: 0,
            outbound,
        }
    }

    /// Header for the next transaction. The zxid is only claimed once the
    /// transaction commits.
    fn next_header(
        &self,
        session_id: SessionId,
    ) -> TxnHeader {
        TxnHeader {
            session_id,
            zxid: self.last_zxid + 1,
            time: timestamp_millis(),
        }
    }

    // -
    // Sessions

    pub(crate) fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub(crate) fn sessions_mut(&mut self) -> &mut SessionTracker {
        &mut self.sessions
    }

    /// Close or expire a session and remove everything bound to it.
    ///
    /// Order: the session turns terminal first, then its watchers are
    /// disconnected, then its ephemerals are deleted as one transaction
    /// through the regular delete path. Already-terminal sessions are a
    /// no-op.
    pub(crate) fn terminate_session(
        &mut self,
        session_id: SessionId,
        state: SessionState,
    ) -> Result<(), KeeperError> {
        let Some(ephemerals) = self.sessions.terminate(session_id, state) else {
            return match self.sessions.state(session_id) {
                Some(_) => Ok(()),
                None => Err(KeeperError::SessionExpired { session_id }),
            };
        };

        for watcher_id in self.watches.watchers_of_session(session_id) {
            self.disconnect_watcher(watcher_id);
        }

        let header = self.next_header(session_id);
        let mut committed = false;
        for path in ephemerals {
            let owned = self.tree.exists(&path).ok().flatten().and_then(Znode::owner);
            if owned != Some(session_id) {
                warn!(session_id = %session_id, %path, "Ephemeral no longer owned by session, skipped");
                continue;
            }

            let op = Operation::delete(path, ANY_VERSION);
            match TransactionCoordinator::execute(&mut self.tree, &header, &op) {
                Ok(mutation) => {
                    self.publish(&mutation, header.zxid);
                    committed = true;
                }
                Err(e) if e.is_already_satisfied() => {
                    debug!(session_id = %session_id, path = op.path(), "Ephemeral already gone");
                }
                Err(e) => {
                    warn!(session_id = %session_id, path = op.path(), error = %e, "Ephemeral cleanup failed");
                }
            }
        }

        if committed {
            self.last_zxid = header.zxid;
        }
        self.update_gauges();
        Ok(())
    }

    // -
    // Mutations

    /// Apply a single op as its own transaction.
    pub(crate) fn submit(
        &mut self,
        session_id: SessionId,
        op: &Operation,
    ) -> Result<OpResult, KeeperError> {
        self.sessions.ensure_active(session_id)?;

        let header = self.next_header(session_id);
        let mutation = TransactionCoordinator::execute(&mut self.tree, &header, op)?;
        if op.is_write() {
            self.last_zxid = header.zxid;
            self.publish(&mutation, header.zxid);
        }
        Ok(OpResult::from(&mutation))
    }

    /// Apply a batch atomically; all ops share one zxid.
    pub(crate) fn multi(
        &mut self,
        session_id: SessionId,
        ops: &[Operation],
    ) -> Result<Vec<OpResult>, Error> {
        self.sessions.ensure_active(session_id)?;

        let header = self.next_header(session_id);
        let mutations = TransactionCoordinator::prepare(&self.tree, &header, ops)?;
        TransactionCoordinator::commit(&mut self.tree, &mutations);

        if ops.iter().any(Operation::is_write) {
            self.last_zxid = header.zxid;
        }
        for mutation in &mutations {
            self.publish(mutation, header.zxid);
        }
        Ok(mutations.iter().map(OpResult::from).collect())
    }

    /// Side effects of one committed mutation.
    fn publish(
        &mut self,
        mutation: &Mutation,
        zxid: u64,
    ) {
        match mutation {
            Mutation::Create {
                path,
                node,
                parent_path,
                ..
            } => {
                if let Some(owner) = node.owner() {
                    self.sessions.register_ephemeral(owner, path);
                }
                debug!(%path, zxid, mode = ?node.mode, "Znode created");
                self.emit(EventType::NodeCreated, path, zxid);
                self.emit(EventType::NodeChildrenChanged, parent_path, zxid);
            }
            Mutation::SetData { path, node } => {
                debug!(%path, zxid, version = node.stat.version, "Znode data changed");
                self.emit(EventType::NodeDataChanged, path, zxid);
            }
            Mutation::Delete {
                path,
                removed,
                parent_path,
                ..
            } => {
                if let Some(owner) = removed.owner() {
                    self.sessions.unregister_ephemeral(owner, path);
                }
                debug!(%path, zxid, "Znode deleted");
                self.emit(EventType::NodeDeleted, path, zxid);
                self.emit(EventType::NodeChildrenChanged, parent_path, zxid);
            }
            Mutation::Check { .. } => {}
        }
    }

    fn emit(
        &mut self,
        event_type: EventType,
        path: &str,
        zxid: u64,
    ) {
        for delivery in self.watches.notify(event_type, path, zxid) {
            self.outbound.push(Outbound::Event(delivery));
        }
        REGISTERED_WATCHES.set(self.watches.watch_count() as i64);
    }

    // -
    // Reads

    pub(crate) fn exists(
        &self,
        path: &str,
    ) -> Result<Option<Stat>, KeeperError> {
        Ok(self.tree.exists(path)?.map(|node| node.stat))
    }

    pub(crate) fn get_data(
        &self,
        path: &str,
    ) -> Result<(Bytes, Stat), KeeperError> {
        self.tree.get_data(path)
    }

    pub(crate) fn get_children(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat), KeeperError> {
        self.tree.get_children(path)
    }

    pub(crate) fn last_zxid(&self) -> u64 {
        self.last_zxid
    }

    pub(crate) fn node_count(&self) -> usize {
        self.tree.len()
    }

    // -
    // Watches

    /// New watcher identity; a bound session must be live.
    pub(crate) fn connect_watcher(
        &mut self,
        session_id: Option<SessionId>,
    ) -> Result<WatcherId, KeeperError> {
        if let Some(session_id) = session_id {
            self.sessions.ensure_active(session_id)?;
        }
        Ok(self.watches.connect(session_id))
    }

    /// Remove a watcher with all its registrations and close its outbound
    /// channel. Returns `false` for unknown watchers.
    pub(crate) fn disconnect_watcher(
        &mut self,
        watcher_id: WatcherId,
    ) -> bool {
        if !self.watches.disconnect(watcher_id) {
            return false;
        }
        self.outbound.push(Outbound::Disconnect(watcher_id));
        REGISTERED_WATCHES.set(self.watches.watch_count() as i64);
        true
    }

    pub(crate) fn add_watch(
        &mut self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) -> Result<bool, KeeperError> {
        validate_path(path)?;
        let added = self.watches.register(path, watcher_id, mode)?;
        REGISTERED_WATCHES.set(self.watches.watch_count() as i64);
        Ok(added)
    }

    pub(crate) fn remove_watch(
        &mut self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) -> Result<(), KeeperError> {
        validate_path(path)?;
        self.watches.remove(path, watcher_id, mode)?;
        REGISTERED_WATCHES.set(self.watches.watch_count() as i64);
        Ok(())
    }

    pub(crate) fn watches(&self) -> &WatchManager {
        &self.watches
    }

    pub(crate) fn update_gauges(&self) {
        ACTIVE_SESSIONS.set(self.sessions.active_count() as i64);
        REGISTERED_WATCHES.set(self.watches.watch_count() as i64);
    }
}
