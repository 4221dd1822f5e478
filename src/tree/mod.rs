//! Versioned znode tree (NodeStore).

mod path;
mod staged;
mod store;
mod znode;


pub use path::*;
pub(crate) use staged::StagedTree;
pub use store::*;
pub use znode::*;
