use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::CreateMode;
use crate::Keeper;
use crate::KeeperConfig;
use crate::SessionId;
use crate::WatchEvent;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Defaults with short session timeouts.
pub(crate) fn test_config() -> KeeperConfig {
    let mut config = KeeperConfig::default();
    config.session.tick_time_ms = 50;
    config.session.tick_interval_ms = 10;
    config
}

pub(crate) fn test_keeper() -> Keeper {
    enable_logger();
    Keeper::new(test_config()).expect("keeper should start")
}

pub(crate) fn open_session(keeper: &Keeper) -> SessionId {
    keeper.create_session(None).expect("session should open").0
}

/// Create every node of `paths` in order as persistent, empty nodes.
pub(crate) fn create_all(
    keeper: &Keeper,
    session: SessionId,
    paths: &[&str],
) {
    for path in paths {
        keeper
            .create(session, path, Bytes::new(), CreateMode::Persistent)
            .expect("fixture node should be created");
    }
}

/// Wait for the next event, failing the test after one second.
pub(crate) async fn next_event(receiver: &mut mpsc::UnboundedReceiver<WatchEvent>) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .expect("event should arrive")
        .expect("channel should stay open")
}

/// Give the dispatcher thread time to flush, then collect whatever arrived.
pub(crate) async fn drain_events(receiver: &mut mpsc::UnboundedReceiver<WatchEvent>) -> Vec<WatchEvent> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
