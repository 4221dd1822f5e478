use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::NO_EPHEMERAL_OWNER;
use crate::session::SessionId;

/// Determines how a znode is created and how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    /// Lives until explicitly deleted
    Persistent,
    /// Deleted when the owning session closes or expires
    Ephemeral,
    /// Persistent, name suffixed with the parent's child counter
    PersistentSequential,
    /// Ephemeral, name suffixed with the parent's child counter
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Per-node metadata, modelled on the UNIX `stat` structure.
///
/// `czxid`/`mzxid`/`pzxid` are the transaction ids that created the node,
/// last changed its data and last changed its child list. `ctime`/`mtime`
/// are epoch milliseconds and only informative; ordering decisions always
/// use zxids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stat {
    pub czxid: u64,
    pub mzxid: u64,
    pub pzxid: u64,
    pub ctime: u64,
    pub mtime: u64,
    /// Number of data changes
    pub version: i32,
    /// Number of child-list changes
    pub cversion: i32,
    /// Owning session id, 0 for persistent nodes
    pub ephemeral_owner: u64,
    pub data_length: u32,
    pub num_children: u32,
}

/// A node record in the path-keyed arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Znode {
    pub data: Bytes,
    pub stat: Stat,
    pub mode: CreateMode,
}

impl Znode {
    pub(crate) fn new(
        data: Bytes,
        mode: CreateMode,
        owner: Option<SessionId>,
        zxid: u64,
        time: u64,
    ) -> Self {
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            ctime: time,
            mtime: time,
            version: 0,
            cversion: 0,
            ephemeral_owner: owner.map(|s| s.as_u64()).unwrap_or(NO_EPHEMERAL_OWNER),
            data_length: data.len() as u32,
            num_children: 0,
        };
        Self { data, stat, mode }
    }

    /// The tree root: persistent, empty, created before any transaction.
    pub(crate) fn root() -> Self {
        Self::new(Bytes::new(), CreateMode::Persistent, None, 0, 0)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.mode.is_ephemeral()
    }

    /// Session owning this node, `None` unless ephemeral.
    pub fn owner(&self) -> Option<SessionId> {
        match self.stat.ephemeral_owner {
            NO_EPHEMERAL_OWNER => None,
            id => Some(SessionId::from(id)),
        }
    }
}
