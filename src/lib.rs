//! # d-keeper
//!
//! An in-memory hierarchical coordination kernel in the ZooKeeper mould:
//!
//! - a versioned znode tree (`tree`)
//! - sessions that own ephemeral nodes (`session`)
//! - one-shot, persistent and persistent-recursive watches (`watch`)
//! - atomic multi-op transactions (`txn`)
//!
//! All four live behind one serialization point, the [`Keeper`] handle.
//! Transport, persistence and authentication are left to the embedding
//! process.
//!
//! ```ignore
//! let keeper = Keeper::new(KeeperConfig::new()?)?;
//! let (session, _timeout) = keeper.create_session(None)?;
//!
//! let mut watcher = keeper.connect_watcher(Some(session))?;
//! keeper.add_watch("/app", watcher.id(), WatchMode::PersistentRecursive)?;
//!
//! keeper.create(session, "/app", "v1", CreateMode::Persistent)?;
//! let event = watcher.receiver_mut().unwrap().recv().await;
//! ```

mod config;
mod constants;
mod errors;
mod kernel;
mod metrics;
mod session;
mod tree;
mod txn;
mod utils;
mod watch;

pub use self::config::*;
pub use constants::*;
pub use errors::*;
pub use kernel::*;
pub use metrics::*;
pub use session::*;
pub use tree::*;
pub use txn::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
