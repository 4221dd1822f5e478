//! Outbound watch event delivery
//!
//! ```text
//! Kernel critical section:
//!   commit -> WatchManager::notify() -> EventQueue::push() [unbounded, commit order]
//!                                              ↓
//! Dispatcher thread:
//!   queue.recv() -> NotificationDispatcher::dispatch(watcher_id, event)
//!                                              ↓
//! ChannelNotifier (default):
//!   per-watcher tokio mpsc -> WatcherHandle::receiver_mut()
//! ```
//!
//! The queue is a single FIFO filled while the kernel lock is held, and a
//! single thread drains it, so every watcher sees events in commit order.
//! Nothing on this path drops events: the queue and the per-watcher channels
//! are unbounded, and a watcher's channel is closed only after every event
//! queued before its disconnect has been forwarded.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::select;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Delivery;
use super::WatchEvent;
use super::WatcherId;
use crate::metrics::DELIVERED_EVENTS;
use crate::Result;
use crate::SystemError;

/// Transport-facing collaborator that carries events to remote watchers.
///
/// Implementations must not call back into the kernel from either method.
#[cfg_attr(test, automock)]
pub trait NotificationDispatcher: Send + Sync + 'static {
    /// Deliver one event. Called from the dispatcher thread, in commit order.
    fn dispatch(
        &self,
        watcher_id: WatcherId,
        event: WatchEvent,
    );

    /// The watcher is gone; no further events will be dispatched to it.
    fn disconnect(
        &self,
        watcher_id: WatcherId,
    );
}

/// Item on the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Event(Delivery),
    Disconnect(WatcherId),
}

/// Producer side of the outbound queue, held by the kernel state.
#[derive(Debug, Clone)]
pub(crate) struct EventQueue {
    sender: Sender<Outbound>,
}

impl EventQueue {
    pub(crate) fn push(
        &self,
        item: Outbound,
    ) {
        if let Err(e) = self.sender.send(item) {
            warn!(item = ?e.into_inner(), "Outbound queue closed, item discarded");
        }
    }
}

/// Default [`NotificationDispatcher`]: one unbounded tokio channel per watcher.
#[derive(Debug, Default)]
pub struct ChannelNotifier {
    channels: DashMap<WatcherId, mpsc::UnboundedSender<WatchEvent>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the channel for a watcher. Must happen before the watcher can
    /// be addressed by any event.
    pub fn subscribe(
        &self,
        watcher_id: WatcherId,
    ) -> mpsc::UnboundedReceiver<WatchEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels.insert(watcher_id, sender);
        receiver
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl NotificationDispatcher for ChannelNotifier {
    fn dispatch(
        &self,
        watcher_id: WatcherId,
        event: WatchEvent,
    ) {
        match self.channels.get(&watcher_id) {
            Some(sender) => {
                if sender.send(event).is_err() {
                    trace!(watcher_id = %watcher_id, "Watcher receiver dropped");
                }
            }
            None => trace!(watcher_id = %watcher_id, "No channel for watcher"),
        }
    }

    fn disconnect(
        &self,
        watcher_id: WatcherId,
    ) {
        self.channels.remove(&watcher_id);
    }
}

/// Background thread draining the outbound queue into a
/// [`NotificationDispatcher`].
pub(crate) struct WatchDispatcher {
    receiver: Receiver<Outbound>,
    notifier: Arc<dyn NotificationDispatcher>,
    batch_size: usize,

    /// Dispatcher thread handle (None when not running)
    thread_handle: Mutex<Option<JoinHandle<()>>>,

    /// Shutdown signal sender (None when not running)
    shutdown_tx: Mutex<Option<Sender<()>>>,
}

impl std::fmt::Debug for WatchDispatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchDispatcher")
            .field("pending", &self.receiver.len())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl WatchDispatcher {
    /// Create the dispatcher and the queue feeding it.
    pub(crate) fn new(
        notifier: Arc<dyn NotificationDispatcher>,
        batch_size: usize,
    ) -> (Self, EventQueue) {
        let (sender, receiver) = unbounded();
        let dispatcher = Self {
            receiver,
            notifier,
            batch_size: batch_size.max(1),
            thread_handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        };
        (dispatcher, EventQueue { sender })
    }

    /// Spawn the dispatcher thread. Calling it while running is a no-op.
    pub(crate) fn start(&self) -> Result<()> {
        let mut handle_guard = self.thread_handle.lock();
        if handle_guard.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let receiver = self.receiver.clone();
        let notifier = Arc::clone(&self.notifier);
        let batch_size = self.batch_size;

        let handle = std::thread::Builder::new()
            .name("keeper-watch-dispatcher".into())
            .spawn(move || {
                debug!("Watch dispatcher thread started");
                loop {
                    select! {
                        recv(receiver) -> item => match item {
                            Ok(item) => {
                                forward(notifier.as_ref(), item);
                                for item in receiver.try_iter().take(batch_size - 1) {
                                    forward(notifier.as_ref(), item);
                                }
                            }
                            Err(_) => {
                                warn!("Watch event queue closed unexpectedly");
                                break;
                            }
                        },
                        recv(shutdown_rx) -> _ => {
                            // flush what was committed before the stop request
                            for item in receiver.try_iter() {
                                forward(notifier.as_ref(), item);
                            }
                            debug!("Watch dispatcher received shutdown signal");
                            break;
                        }
                    }
                }
                debug!("Watch dispatcher thread stopped");
            })
            .map_err(|source| SystemError::WorkerSpawn {
                worker: "watch dispatcher",
                source,
            })?;

        *handle_guard = Some(handle);
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        Ok(())
    }

    /// Stop the thread after it has forwarded everything already queued.
    pub(crate) fn stop(&self) {
        // held across the join so `flush_stopped` waits for the final drain
        let mut handle_guard = self.thread_handle.lock();
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = handle_guard.take() {
            if handle.join().is_err() {
                warn!("Watch dispatcher thread panicked");
            }
        }
    }

    /// Forward anything queued after the thread stopped, on the calling
    /// thread. No-op while the thread is running: it drains the queue itself.
    pub(crate) fn flush_stopped(&self) {
        let handle_guard = self.thread_handle.lock();
        if handle_guard.is_some() {
            return;
        }
        for item in self.receiver.try_iter() {
            forward(self.notifier.as_ref(), item);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread_handle.lock().is_some()
    }
}

impl Drop for WatchDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward(
    notifier: &dyn NotificationDispatcher,
    item: Outbound,
) {
    match item {
        Outbound::Event(Delivery { watcher_id, event }) => {
            DELIVERED_EVENTS.with_label_values(&[event.event_type.as_str()]).inc();
            notifier.dispatch(watcher_id, event);
        }
        Outbound::Disconnect(watcher_id) => notifier.disconnect(watcher_id),
    }
}
