use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::session::SessionId;
use crate::tree::CreateMode;
use crate::tree::Mutation;
use crate::tree::Stat;
use crate::KeeperError;

/// One mutating request, or a version assertion (`Check`).
///
/// `version` is the expected current version; `-1` skips the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create {
        path: String,
        data: Bytes,
        mode: CreateMode,
    },
    SetData {
        path: String,
        data: Bytes,
        version: i32,
    },
    Delete {
        path: String,
        version: i32,
    },
    Check {
        path: String,
        version: i32,
    },
}

impl Operation {
    pub fn create(
        path: impl Into<String>,
        data: impl Into<Bytes>,
        mode: CreateMode,
    ) -> Self {
        Operation::Create {
            path: path.into(),
            data: data.into(),
            mode,
        }
    }

    pub fn set_data(
        path: impl Into<String>,
        data: impl Into<Bytes>,
        version: i32,
    ) -> Self {
        Operation::SetData {
            path: path.into(),
            data: data.into(),
            version,
        }
    }

    pub fn delete(
        path: impl Into<String>,
        version: i32,
    ) -> Self {
        Operation::Delete {
            path: path.into(),
            version,
        }
    }

    pub fn check(
        path: impl Into<String>,
        version: i32,
    ) -> Self {
        Operation::Check {
            path: path.into(),
            version,
        }
    }

    /// Requested target path (before any sequential suffix).
    pub fn path(&self) -> &str {
        match self {
            Operation::Create { path, .. }
            | Operation::SetData { path, .. }
            | Operation::Delete { path, .. }
            | Operation::Check { path, .. } => path,
        }
    }

    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::SetData { .. } => "set_data",
            Operation::Delete { .. } => "delete",
            Operation::Check { .. } => "check",
        }
    }

    /// Whether applying this op changes the tree.
    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Check { .. })
    }
}

/// Per-op outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    Create {
        /// Actual created path, sequential suffix included
        path: String,
        stat: Stat,
    },
    SetData {
        stat: Stat,
    },
    Delete,
    Check,
    /// This op failed validation
    Error {
        error: KeeperError,
    },
    /// Not applied because a sibling op in the same batch failed
    Aborted,
}

impl OpResult {
    pub fn is_ok(&self) -> bool {
        !matches!(self, OpResult::Error { .. } | OpResult::Aborted)
    }

    /// New version of the target node, for ops that leave one behind.
    pub fn version(&self) -> Option<i32> {
        match self {
            OpResult::Create { stat, .. } | OpResult::SetData { stat } => Some(stat.version),
            _ => None,
        }
    }
}

impl From<&Mutation> for OpResult {
    fn from(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Create { path, node, .. } => OpResult::Create {
                path: path.clone(),
                stat: node.stat,
            },
            Mutation::SetData { node, .. } => OpResult::SetData { stat: node.stat },
            Mutation::Delete { .. } => OpResult::Delete,
            Mutation::Check { .. } => OpResult::Check,
        }
    }
}

/// Identity of the transaction a mutation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnHeader {
    /// Session on whose behalf the transaction runs (ephemeral owner)
    pub session_id: SessionId,
    pub zxid: u64,
    /// Epoch millis, stamped into ctime/mtime
    pub time: u64,
}
