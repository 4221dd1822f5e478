//! Operations and multi-op transactions.

mod coordinator;
mod op;


pub use coordinator::*;
pub use op::*;
