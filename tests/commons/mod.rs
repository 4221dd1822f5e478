use std::time::Duration;

use d_keeper::Keeper;
use d_keeper::KeeperConfig;
use d_keeper::SessionId;
use d_keeper::WatchEvent;
use tokio::sync::mpsc::UnboundedReceiver;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

pub fn start_keeper() -> Keeper {
    enable_logger();
    let mut config = KeeperConfig::default();
    config.session.tick_time_ms = 50;
    config.session.tick_interval_ms = 20;
    Keeper::new(config).expect("keeper should start")
}

pub fn connect(keeper: &Keeper) -> SessionId {
    keeper.create_session(None).expect("session should open").0
}

pub async fn recv_event(receiver: &mut UnboundedReceiver<WatchEvent>) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("event should arrive in time")
        .expect("watch channel closed")
}

/// Events already dispatched, after letting the dispatcher catch up.
pub async fn pending_events(receiver: &mut UnboundedReceiver<WatchEvent>) -> Vec<WatchEvent> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
