//! Coordination Kernel Error Hierarchy
//!
//! Client-visible failures (the ZooKeeper-style taxonomy) are [`KeeperError`]s.
//! A failed multi-op batch surfaces as a [`TransactionAborted`], which carries the
//! first failing op's error plus the per-op status list. Kernel-internal faults
//! are [`SystemError`]s. None of these are retried internally.

use config::ConfigError;

use crate::session::SessionId;
use crate::txn::OpResult;
use crate::watch::WatcherId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Kernel infrastructure failures (worker threads, shutdown)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Single operation rejected by the tree, session or watch rules
    #[error(transparent)]
    Keeper(#[from] KeeperError),

    /// Multi-op batch rejected; nothing was applied
    #[error(transparent)]
    Transaction(#[from] TransactionAborted),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// The client-visible error behind this failure, if any.
    ///
    /// For an aborted transaction this is the first failing op's error.
    pub fn keeper_error(&self) -> Option<&KeeperError> {
        match self {
            Error::Keeper(e) => Some(e),
            Error::Transaction(aborted) => Some(&aborted.error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeeperError {
    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    /// Optimistic concurrency check failed
    #[error("Version conflict at {path} (expected: {expected}, actual: {actual})")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    /// Plain delete of a node that still has children
    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    #[error("Parent of {path} does not exist")]
    NoParent { path: String },

    #[error("Ephemeral node {parent} cannot have children (requested: {path})")]
    ParentIsEphemeral { path: String, parent: String },

    /// Operation submitted for an unknown, expired or closed session
    #[error("Session {session_id} is expired or closed")]
    SessionExpired { session_id: SessionId },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Data for {path} is {len} bytes, limit is {limit}")]
    DataTooLarge {
        path: String,
        len: usize,
        limit: usize,
    },

    #[error("No watch at {path} for watcher {watcher_id}")]
    NoWatcher { path: String, watcher_id: WatcherId },

    #[error("Bad arguments: {0}")]
    BadArguments(String),
}

impl KeeperError {
    /// Numeric code as used by ZooKeeper clients (`KeeperException.Code`).
    pub fn code(&self) -> i32 {
        match self {
            KeeperError::NoNode { .. } | KeeperError::NoParent { .. } => -101,
            KeeperError::BadVersion { .. } => -103,
            KeeperError::ParentIsEphemeral { .. } => -108,
            KeeperError::NodeExists { .. } => -110,
            KeeperError::NotEmpty { .. } => -111,
            KeeperError::SessionExpired { .. } => -112,
            KeeperError::NoWatcher { .. } => -121,
            KeeperError::InvalidPath { .. }
            | KeeperError::DataTooLarge { .. }
            | KeeperError::BadArguments(_) => -8,
        }
    }

    /// Failures that mean "the node is already gone or already changed";
    /// session cleanup treats them as satisfied.
    pub fn is_already_satisfied(&self) -> bool {
        matches!(self, KeeperError::NoNode { .. } | KeeperError::BadVersion { .. })
    }
}

/// A multi-op batch failed validation; the tree is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transaction aborted at op {index}: {error}")]
pub struct TransactionAborted {
    /// Position of the first failing op
    pub index: usize,
    /// Error of the first failing op
    pub error: KeeperError,
    /// One entry per submitted op: `Error` for the failing op, `Aborted` for the rest
    pub results: Vec<OpResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Kernel no longer accepts requests
    #[error("Kernel has been shut down")]
    KernelShutdown,

    /// Background worker could not be started
    #[error("Failed to spawn {worker} worker: {source}")]
    WorkerSpawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },
}
