//! The coordination kernel: one serialization point in front of the tree,
//! the session table and the watch registry.

mod keeper;
mod state;


pub use keeper::Keeper;
pub(crate) use state::KeeperState;
