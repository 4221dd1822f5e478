//! SessionTracker
//!
//! Owns session identity and lifecycle, and the set of ephemeral paths each
//! live session owns. It never touches the tree: terminating a session hands
//! the owned paths back to the kernel, which deletes them through the normal
//! delete path inside the same critical section.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::config::SessionConfig;
use crate::KeeperError;

/// Opaque session identity, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        SessionId(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connected,
    Expired,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Connected)
    }
}

#[derive(Debug)]
struct Session {
    timeout: Duration,
    deadline: Instant,
    ephemerals: BTreeSet<String>,
}

/// Seed for the session id sequence: server id in the top byte, the
/// creation time in milliseconds below it.
pub(crate) fn initial_session_id(
    server_id: u8,
    now_ms: u64,
) -> u64 {
    ((now_ms << 24) >> 8) | ((server_id as u64) << 56)
}

#[derive(Debug)]
pub struct SessionTracker {
    /// Live (CONNECTED) sessions
    sessions: HashMap<SessionId, Session>,

    /// Final state of recently terminated sessions, oldest first
    tombstones: HashMap<SessionId, SessionState>,
    tombstone_order: VecDeque<SessionId>,

    next_id: u64,
    config: SessionConfig,
}

impl SessionTracker {
    pub fn new(
        server_id: u8,
        now_ms: u64,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            tombstones: HashMap::new(),
            tombstone_order: VecDeque::new(),
            next_id: initial_session_id(server_id, now_ms),
            config,
        }
    }

    /// Open a new CONNECTED session. The requested timeout is clamped into
    /// the configured bounds.
    pub fn create_session(
        &mut self,
        requested_timeout: Option<Duration>,
        now: Instant,
    ) -> (SessionId, Duration) {
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let timeout = self.config.negotiate_timeout(requested_timeout);
        self.sessions.insert(
            id,
            Session {
                timeout,
                deadline: now + timeout,
                ephemerals: BTreeSet::new(),
            },
        );

        info!(session_id = %id, timeout_ms = timeout.as_millis() as u64, "Session created");
        (id, timeout)
    }

    /// Renew the session deadline.
    pub fn touch(
        &mut self,
        id: SessionId,
        now: Instant,
    ) -> Result<(), KeeperError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(KeeperError::SessionExpired { session_id: id })?;
        session.deadline = now + session.timeout;
        Ok(())
    }

    pub fn ensure_active(
        &self,
        id: SessionId,
    ) -> Result<(), KeeperError> {
        if self.sessions.contains_key(&id) {
            Ok(())
        } else {
            Err(KeeperError::SessionExpired { session_id: id })
        }
    }

    pub fn state(
        &self,
        id: SessionId,
    ) -> Option<SessionState> {
        if self.sessions.contains_key(&id) {
            return Some(SessionState::Connected);
        }
        self.tombstones.get(&id).copied()
    }

    pub fn timeout(
        &self,
        id: SessionId,
    ) -> Option<Duration> {
        self.sessions.get(&id).map(|s| s.timeout)
    }

    /// No-op for terminated or unknown sessions: cleanup races are expected.
    pub fn register_ephemeral(
        &mut self,
        id: SessionId,
        path: &str,
    ) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.ephemerals.insert(path.to_string());
        }
    }

    /// No-op for terminated or unknown sessions.
    pub fn unregister_ephemeral(
        &mut self,
        id: SessionId,
        path: &str,
    ) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.ephemerals.remove(path);
        }
    }

    pub fn ephemerals(
        &self,
        id: SessionId,
    ) -> Vec<String> {
        self.sessions
            .get(&id)
            .map(|s| s.ephemerals.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `true` only for a live session whose deadline is at or before `now`.
    pub fn is_past_deadline(
        &self,
        id: SessionId,
        now: Instant,
    ) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.deadline <= now)
    }

    /// Live sessions whose deadline has passed.
    pub fn expired_sessions(
        &self,
        now: Instant,
    ) -> Vec<SessionId> {
        let mut expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort();
        expired
    }

    /// Move a live session into a terminal state and hand back the
    /// ephemeral paths it owned.
    ///
    /// Returns `None` when the session is already terminal or unknown, so
    /// repeated close/expire calls are no-ops.
    pub fn terminate(
        &mut self,
        id: SessionId,
        state: SessionState,
    ) -> Option<Vec<String>> {
        debug_assert!(state.is_terminal());
        let session = self.sessions.remove(&id)?;

        self.bury(id, state);
        info!(
            session_id = %id,
            ?state,
            ephemerals = session.ephemerals.len(),
            "Session terminated"
        );
        Some(session.ephemerals.into_iter().collect())
    }

    fn bury(
        &mut self,
        id: SessionId,
        state: SessionState,
    ) {
        if self.config.tombstone_capacity == 0 {
            return;
        }
        while self.tombstone_order.len() >= self.config.tombstone_capacity {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
                debug!(session_id = %oldest, "Session tombstone evicted");
            }
        }
        self.tombstones.insert(id, state);
        self.tombstone_order.push_back(id);
    }

    /// Number of CONNECTED sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
