//! Watch registry and delivery rule.
//!
//! # Delivery rule
//!
//! For a committed event at `path`:
//!
//! - every `Persistent` and `PersistentRecursive` registration at `path` fires
//! - every `PersistentRecursive` registration at a strict ancestor of `path` fires
//! - every `OneShot` registration at `path` fires and is removed in the same step
//!
//! A watcher receives at most one copy of a given event even when several of
//! its registrations match.
//!
//! # Concurrency
//!
//! The manager is plain data owned by the kernel state and only touched from
//! inside the kernel's critical section; `notify` returns the delivery list
//! and the caller enqueues it before releasing the lock, which keeps
//! per-watcher ordering identical to commit order.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use crate::config::WatchConfig;
use crate::session::SessionId;
use crate::tree::ancestors;
use crate::KeeperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatcherId(u64);

impl WatcherId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for WatcherId {
    fn from(id: u64) -> Self {
        WatcherId(id)
    }
}

impl fmt::Display for WatcherId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchMode {
    /// Fires once, then is removed
    OneShot,
    /// Fires on every event at exactly the watched path
    Persistent,
    /// Fires on every event at the watched path or below it
    PersistentRecursive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    NodeCreated,
    NodeDataChanged,
    NodeDeleted,
    /// Fired at the parent when a child is created or deleted
    NodeChildrenChanged,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::NodeCreated => "node_created",
            EventType::NodeDataChanged => "node_data_changed",
            EventType::NodeDeleted => "node_deleted",
            EventType::NodeChildrenChanged => "node_children_changed",
        }
    }
}

/// A committed change as seen by a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub path: String,
    /// Transaction that produced the change
    pub zxid: u64,
}

/// One event addressed to one watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub watcher_id: WatcherId,
    pub event: WatchEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    watcher_id: WatcherId,
    mode: WatchMode,
}

#[derive(Debug, Default)]
struct WatcherEntry {
    /// Session the watcher belongs to, if any
    session_id: Option<SessionId>,
    registrations: HashSet<(String, WatchMode)>,
}

#[derive(Debug)]
pub struct WatchManager {
    /// Registrations grouped by watched path
    by_path: HashMap<String, Vec<Registration>>,

    /// Connected watchers and what they registered
    watchers: HashMap<WatcherId, WatcherEntry>,

    /// Running total of `by_path` entries
    registered: usize,

    next_id: u64,
    config: WatchConfig,
}

impl WatchManager {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            by_path: HashMap::new(),
            watchers: HashMap::new(),
            registered: 0,
            next_id: 1,
            config,
        }
    }

    /// Allocate a watcher identity, optionally bound to a session.
    pub fn connect(
        &mut self,
        session_id: Option<SessionId>,
    ) -> WatcherId {
        let id = WatcherId(self.next_id);
        self.next_id += 1;
        self.watchers.insert(
            id,
            WatcherEntry {
                session_id,
                registrations: HashSet::new(),
            },
        );
        trace!(watcher_id = %id, ?session_id, "Watcher connected");
        id
    }

    /// Drop a watcher and every registration it holds.
    ///
    /// Returns `false` if the watcher was not connected.
    pub fn disconnect(
        &mut self,
        watcher_id: WatcherId,
    ) -> bool {
        let Some(entry) = self.watchers.remove(&watcher_id) else {
            return false;
        };
        for (path, mode) in entry.registrations {
            self.detach(&path, watcher_id, mode);
        }
        trace!(watcher_id = %watcher_id, "Watcher disconnected");
        true
    }

    pub fn is_connected(
        &self,
        watcher_id: WatcherId,
    ) -> bool {
        self.watchers.contains_key(&watcher_id)
    }

    /// Watchers bound to `session_id`, in id order.
    pub fn watchers_of_session(
        &self,
        session_id: SessionId,
    ) -> Vec<WatcherId> {
        let mut ids: Vec<WatcherId> = self
            .watchers
            .iter()
            .filter(|(_, entry)| entry.session_id == Some(session_id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Add a registration. Re-registering the same `(path, watcher, mode)`
    /// is a no-op and returns `Ok(false)`.
    pub fn register(
        &mut self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) -> Result<bool, KeeperError> {
        let limit = self.config.max_watches_per_watcher;
        let entry = self
            .watchers
            .get_mut(&watcher_id)
            .ok_or_else(|| KeeperError::BadArguments(format!("watcher {watcher_id} is not connected")))?;

        let key = (path.to_string(), mode);
        if entry.registrations.contains(&key) {
            return Ok(false);
        }
        if limit > 0 && entry.registrations.len() >= limit {
            return Err(KeeperError::BadArguments(format!(
                "watcher {watcher_id} already holds {limit} watches"
            )));
        }

        entry.registrations.insert(key);
        self.by_path
            .entry(path.to_string())
            .or_default()
            .push(Registration { watcher_id, mode });
        self.registered += 1;

        trace!(watcher_id = %watcher_id, %path, ?mode, "Watch registered");
        Ok(true)
    }

    /// Remove a single registration.
    pub fn remove(
        &mut self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) -> Result<(), KeeperError> {
        let removed = self
            .watchers
            .get_mut(&watcher_id)
            .map(|entry| entry.registrations.remove(&(path.to_string(), mode)))
            .unwrap_or(false);
        if !removed {
            return Err(KeeperError::NoWatcher {
                path: path.to_string(),
                watcher_id,
            });
        }
        self.detach(path, watcher_id, mode);
        Ok(())
    }

    fn detach(
        &mut self,
        path: &str,
        watcher_id: WatcherId,
        mode: WatchMode,
    ) {
        if let Some(registrations) = self.by_path.get_mut(path) {
            let before = registrations.len();
            registrations.retain(|r| !(r.watcher_id == watcher_id && r.mode == mode));
            self.registered -= before - registrations.len();
            if registrations.is_empty() {
                self.by_path.remove(path);
            }
        }
    }

    /// Resolve the watchers interested in one committed event.
    ///
    /// One-shot registrations at `path` are consumed here, atomically with
    /// building the delivery list.
    pub fn notify(
        &mut self,
        event_type: EventType,
        path: &str,
        zxid: u64,
    ) -> Vec<Delivery> {
        let mut targets: BTreeSet<WatcherId> = BTreeSet::new();
        let mut fired_once: Vec<WatcherId> = Vec::new();

        if let Some(registrations) = self.by_path.get_mut(path) {
            registrations.retain(|r| {
                targets.insert(r.watcher_id);
                if r.mode == WatchMode::OneShot {
                    fired_once.push(r.watcher_id);
                    false
                } else {
                    true
                }
            });
            if registrations.is_empty() {
                self.by_path.remove(path);
            }
        }

        for ancestor in ancestors(path) {
            if let Some(registrations) = self.by_path.get(ancestor) {
                targets.extend(
                    registrations
                        .iter()
                        .filter(|r| r.mode == WatchMode::PersistentRecursive)
                        .map(|r| r.watcher_id),
                );
            }
        }

        self.registered -= fired_once.len();
        for watcher_id in fired_once {
            if let Some(entry) = self.watchers.get_mut(&watcher_id) {
                entry.registrations.remove(&(path.to_string(), WatchMode::OneShot));
            }
        }

        let event = WatchEvent {
            event_type,
            path: path.to_string(),
            zxid,
        };
        let deliveries: Vec<Delivery> = targets
            .into_iter()
            .map(|watcher_id| Delivery {
                watcher_id,
                event: event.clone(),
            })
            .collect();

        if !deliveries.is_empty() {
            trace!(
                %path,
                event_type = event_type.as_str(),
                zxid,
                watchers = deliveries.len(),
                "Event resolved"
            );
        }
        deliveries
    }

    /// Number of registrations at exactly `path`.
    pub fn watcher_count(
        &self,
        path: &str,
    ) -> usize {
        self.by_path.get(path).map(|r| r.len()).unwrap_or(0)
    }

    /// Total number of registrations.
    pub fn watch_count(&self) -> usize {
        self.registered
    }

    /// Number of connected watchers.
    pub fn connected_count(&self) -> usize {
        self.watchers.len()
    }
}
