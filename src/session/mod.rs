//! Sessions: identity, lifecycle, owned ephemerals and deadline tracking.

mod liveness;
mod tracker;


pub use liveness::*;
pub use tracker::*;
