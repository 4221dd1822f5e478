use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::trace;

use super::WatchEvent;
use super::WatcherId;

/// Owner of watcher lifetimes, notified when a handle goes away.
pub(crate) trait ReleaseWatcher: Send + Sync {
    fn release_watcher(
        &self,
        watcher_id: WatcherId,
    );
}

struct WatcherCleanup {
    id: WatcherId,
    owner: Weak<dyn ReleaseWatcher>,
}

impl WatcherCleanup {
    fn run(&self) {
        // kernel already gone: nothing left to unregister from
        if let Some(owner) = self.owner.upgrade() {
            owner.release_watcher(self.id);
        }
    }
}

/// Handle for a connected watcher
///
/// When dropped, the watcher is disconnected and all its registrations are
/// removed.
pub struct WatcherHandle {
    id: WatcherId,
    /// Cleanup state (None if moved to guard via into_receiver)
    cleanup: Option<WatcherCleanup>,
    /// Channel receiver for watch events (Option to allow move out)
    receiver: Option<mpsc::UnboundedReceiver<WatchEvent>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("id", &self.id)
            .field("attached", &self.cleanup.is_some())
            .finish()
    }
}

impl WatcherHandle {
    pub(crate) fn new(
        id: WatcherId,
        owner: Weak<dyn ReleaseWatcher>,
        receiver: Option<mpsc::UnboundedReceiver<WatchEvent>>,
    ) -> Self {
        Self {
            id,
            cleanup: Some(WatcherCleanup { id, owner }),
            receiver,
        }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Get a mutable reference to the receiver
    ///
    /// Returns None if the receiver has been taken via `into_receiver()`, or
    /// if events go to a custom dispatcher.
    pub fn receiver_mut(&mut self) -> Option<&mut mpsc::UnboundedReceiver<WatchEvent>> {
        self.receiver.as_mut()
    }

    /// Consume the handle and return the event receiver
    ///
    /// Cleanup moves to the returned guard, which disconnects the watcher
    /// when dropped. Returns None when the handle has no receiver; the
    /// watcher is then disconnected as the handle drops.
    pub fn into_receiver(mut self) -> Option<(WatcherId, mpsc::UnboundedReceiver<WatchEvent>, WatcherHandleGuard)> {
        let receiver = self.receiver.take()?;
        let cleanup = self.cleanup.take()?;
        Some((self.id, receiver, WatcherHandleGuard { cleanup }))
    }
}

/// Guard that disconnects the watcher when dropped
///
/// Returned from `WatcherHandle::into_receiver()` so cleanup still happens
/// after the receiver has been moved out.
pub struct WatcherHandleGuard {
    cleanup: WatcherCleanup,
}

impl Drop for WatcherHandleGuard {
    fn drop(&mut self) {
        self.cleanup.run();
        trace!(watcher_id = %self.cleanup.id, "Watcher released via guard");
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
            trace!(watcher_id = %cleanup.id, "Watcher released");
        }
    }
}
