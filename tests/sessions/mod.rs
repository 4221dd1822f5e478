use std::time::Duration;

use d_keeper::CreateMode;
use d_keeper::EventType;
use d_keeper::SessionState;
use d_keeper::WatchMode;
use tokio::sync::watch;

use crate::commons::connect;
use crate::commons::recv_event;
use crate::commons::start_keeper;

#[test]
fn test_ephemeral_gone_after_close() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/eph", "", CreateMode::Ephemeral).unwrap();

    keeper.on_session_close(session).unwrap();

    assert_eq!(keeper.exists("/eph").unwrap(), None);
    assert_eq!(keeper.session_state(session), Some(SessionState::Closed));
}

#[tokio::test]
async fn test_liveness_monitor_expires_idle_session() {
    let keeper = start_keeper();
    let (session, timeout) = keeper.create_session(Some(Duration::from_millis(100))).unwrap();
    keeper.create(session, "/member", "", CreateMode::Ephemeral).unwrap();
    let observer = connect(&keeper);
    let mut watcher = keeper.connect_watcher(Some(observer)).unwrap();
    keeper.add_watch("/member", watcher.id(), WatchMode::OneShot).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let monitor = keeper.start_liveness_monitor(shutdown_rx);

    // observer keeps its own session alive while the other one lapses
    let deadline = tokio::time::Instant::now() + timeout * 5;
    while keeper.session_state(session) == Some(SessionState::Connected) {
        assert!(tokio::time::Instant::now() < deadline, "session never expired");
        keeper.touch_session(observer).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let event = recv_event(watcher.receiver_mut().unwrap()).await;
    assert_eq!(event.event_type, EventType::NodeDeleted);
    assert_eq!(event.path, "/member");
    assert_eq!(keeper.session_state(session), Some(SessionState::Expired));
    assert_eq!(keeper.exists("/member").unwrap(), None);
    assert_eq!(keeper.session_state(observer), Some(SessionState::Connected));

    shutdown_tx.send(()).unwrap();
    monitor.await.unwrap();
}

#[test]
fn test_expired_session_cannot_write() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.on_session_timeout(session).unwrap();

    let err = keeper.create(session, "/late", "", CreateMode::Ephemeral).unwrap_err();

    assert_eq!(err.keeper_error().map(|e| e.code()), Some(-112));
    assert_eq!(keeper.exists("/late").unwrap(), None);
}
