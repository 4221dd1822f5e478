use d_keeper::CreateMode;
use d_keeper::EventType;
use d_keeper::WatchMode;
use d_keeper::ANY_VERSION;

use crate::commons::connect;
use crate::commons::pending_events;
use crate::commons::recv_event;
use crate::commons::start_keeper;

#[tokio::test]
async fn test_persistent_watch_one_event_per_set_data() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/p", "", CreateMode::Persistent).unwrap();
    let mut watcher = keeper.connect_watcher(Some(session)).unwrap();
    keeper.add_watch("/p", watcher.id(), WatchMode::Persistent).unwrap();

    let mut expected_zxids = Vec::new();
    for i in 0..5 {
        keeper.set_data(session, "/p", format!("v{i}"), i).unwrap();
        expected_zxids.push(keeper.last_zxid());
    }

    let events = pending_events(watcher.receiver_mut().unwrap()).await;
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e.event_type == EventType::NodeDataChanged && e.path == "/p"));
    assert_eq!(events.iter().map(|e| e.zxid).collect::<Vec<_>>(), expected_zxids);
    assert_eq!(keeper.watch_count(), 1);
}

#[tokio::test]
async fn test_one_shot_watch_fires_exactly_once() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/o", "", CreateMode::Persistent).unwrap();
    let mut watcher = keeper.connect_watcher(None).unwrap();
    keeper.add_watch("/o", watcher.id(), WatchMode::OneShot).unwrap();
    // re-registering the same triple is a no-op
    assert!(!keeper.add_watch("/o", watcher.id(), WatchMode::OneShot).unwrap());

    keeper.set_data(session, "/o", "1", ANY_VERSION).unwrap();
    keeper.set_data(session, "/o", "2", ANY_VERSION).unwrap();
    keeper.delete(session, "/o", ANY_VERSION).unwrap();

    let events = pending_events(watcher.receiver_mut().unwrap()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::NodeDataChanged);
}

#[tokio::test]
async fn test_recursive_watch_on_parent_sees_children() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/svc", "", CreateMode::Persistent).unwrap();
    let mut watcher = keeper.connect_watcher(None).unwrap();
    keeper.add_watch("/svc", watcher.id(), WatchMode::PersistentRecursive).unwrap();

    keeper.create(session, "/svc/a", "", CreateMode::Persistent).unwrap();
    keeper.create(session, "/svc/a/deep", "", CreateMode::Persistent).unwrap();
    keeper.delete(session, "/svc/a/deep", ANY_VERSION).unwrap();

    let receiver = watcher.receiver_mut().unwrap();
    let mut seen = Vec::new();
    for _ in 0..6 {
        let event = recv_event(receiver).await;
        seen.push((event.event_type, event.path));
    }
    assert_eq!(
        seen,
        vec![
            (EventType::NodeCreated, "/svc/a".to_string()),
            (EventType::NodeChildrenChanged, "/svc".to_string()),
            (EventType::NodeCreated, "/svc/a/deep".to_string()),
            (EventType::NodeChildrenChanged, "/svc/a".to_string()),
            (EventType::NodeDeleted, "/svc/a/deep".to_string()),
            (EventType::NodeChildrenChanged, "/svc/a".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_watchers_are_isolated() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    let mut left = keeper.connect_watcher(None).unwrap();
    let mut right = keeper.connect_watcher(None).unwrap();
    keeper.add_watch("/left", left.id(), WatchMode::Persistent).unwrap();
    keeper.add_watch("/right", right.id(), WatchMode::Persistent).unwrap();

    keeper.create(session, "/left", "", CreateMode::Persistent).unwrap();

    assert_eq!(pending_events(left.receiver_mut().unwrap()).await.len(), 1);
    assert!(pending_events(right.receiver_mut().unwrap()).await.is_empty());
}

#[tokio::test]
async fn test_into_receiver_guard_disconnects_on_drop() {
    let keeper = start_keeper();
    let watcher = keeper.connect_watcher(None).unwrap();
    keeper.add_watch("/g", watcher.id(), WatchMode::Persistent).unwrap();

    let (id, mut receiver, guard) = watcher.into_receiver().unwrap();
    assert_eq!(keeper.watch_count(), 1);
    drop(guard);

    assert_eq!(keeper.watch_count(), 0);
    assert!(!keeper.on_watcher_disconnect(id));
    assert!(receiver.recv().await.is_none());
}
