//! Watch mechanism for monitoring znode changes
//!
//! Two halves:
//!
//! 1. [`WatchManager`]: the registry. Lives inside the kernel state and turns
//!    each committed mutation into a list of `(watcher, event)` deliveries.
//! 2. The dispatcher: an outbound FIFO plus a background thread that hands
//!    deliveries to a [`NotificationDispatcher`] collaborator. The default
//!    collaborator, [`ChannelNotifier`], feeds one tokio channel per watcher.
//!
//! Watchers never get callbacks into the state machine; they only read from
//! their own queue.

mod dispatcher;
mod handle;
mod manager;


pub use dispatcher::ChannelNotifier;
#[cfg(test)]
pub use dispatcher::MockNotificationDispatcher;
pub use dispatcher::NotificationDispatcher;
pub(crate) use dispatcher::EventQueue;
pub(crate) use dispatcher::Outbound;
pub(crate) use dispatcher::WatchDispatcher;
pub(crate) use handle::ReleaseWatcher;
pub use handle::WatcherHandle;
pub use handle::WatcherHandleGuard;
pub use manager::*;
