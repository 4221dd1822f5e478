use std::sync::Barrier;
use std::thread;

use d_keeper::CreateMode;
use d_keeper::EventType;
use d_keeper::KeeperError;
use d_keeper::Operation;
use d_keeper::WatchEvent;
use d_keeper::WatchMode;
use d_keeper::ANY_VERSION;

use crate::commons::connect;
use crate::commons::start_keeper;

const THREADS: usize = 8;

#[test]
fn test_conditional_set_data_has_one_winner_per_version() {
    const ROUNDS: i32 = 50;
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/counter", "", CreateMode::Persistent).unwrap();
    let barrier = Barrier::new(THREADS);

    let wins: Vec<Vec<i32>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|writer| {
                let keeper = keeper.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let mut won = Vec::new();
                    loop {
                        let (_, stat) = keeper.get_data("/counter").unwrap();
                        if stat.version >= ROUNDS {
                            return won;
                        }
                        match keeper.set_data(session, "/counter", format!("w{writer}"), stat.version) {
                            Ok(updated) => {
                                assert_eq!(updated.version, stat.version + 1);
                                won.push(stat.version);
                            }
                            Err(e) => assert!(
                                matches!(e.keeper_error(), Some(KeeperError::BadVersion { .. })),
                                "unexpected error: {e:?}"
                            ),
                        }
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut versions: Vec<i32> = wins.into_iter().flatten().collect();
    versions.sort_unstable();
    assert_eq!(versions, (0..ROUNDS).collect::<Vec<_>>());
    assert_eq!(keeper.get_data("/counter").unwrap().1.version, ROUNDS);
}

#[test]
fn test_readers_never_observe_a_partial_multi() {
    const BATCHES: usize = 200;
    let keeper = start_keeper();
    let session = connect(&keeper);
    for path in ["/a", "/b", "/pair"] {
        keeper.create(session, path, "", CreateMode::Persistent).unwrap();
    }
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        let writer = {
            let keeper = keeper.clone();
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for i in 0..BATCHES {
                    keeper
                        .submit_multi(
                            session,
                            vec![
                                Operation::set_data("/a", format!("{i}"), ANY_VERSION),
                                Operation::set_data("/b", format!("{i}"), ANY_VERSION),
                            ],
                        )
                        .unwrap();
                    let ops = if i % 2 == 0 {
                        vec![
                            Operation::create("/pair/x", "", CreateMode::Persistent),
                            Operation::create("/pair/y", "", CreateMode::Persistent),
                        ]
                    } else {
                        vec![Operation::delete("/pair/x", ANY_VERSION), Operation::delete("/pair/y", ANY_VERSION)]
                    };
                    keeper.submit_multi(session, ops).unwrap();
                }
            })
        };

        let readers: Vec<_> = (1..THREADS)
            .map(|_| {
                let keeper = keeper.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for _ in 0..BATCHES {
                        // /a is written before /b in every batch
                        let a = keeper.get_data("/a").unwrap().1.version;
                        let b = keeper.get_data("/b").unwrap().1.version;
                        assert!(b >= a, "saw /a at version {a} but /b at {b}");

                        let (children, stat) = keeper.get_children("/pair").unwrap();
                        assert!(children.is_empty() || children == ["x", "y"], "partial batch: {children:?}");
                        assert_eq!(stat.num_children as usize, children.len());
                        assert_eq!(stat.cversion % 2, 0);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    });

    assert_eq!(keeper.get_data("/a").unwrap().1.version, BATCHES as i32);
}

#[test]
fn test_watcher_sees_commit_order_under_concurrent_writers() {
    const PER_THREAD: usize = 25;
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/w", "", CreateMode::Persistent).unwrap();
    let mut watcher = keeper.connect_watcher(None).unwrap();
    keeper.add_watch("/w", watcher.id(), WatchMode::PersistentRecursive).unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for writer in 0..THREADS {
            let keeper = keeper.clone();
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    keeper
                        .create(session, &format!("/w/t{writer}-{i:03}"), "", CreateMode::Persistent)
                        .unwrap();
                }
            });
        }
    });
    // flushes every queued event
    keeper.shutdown();

    let receiver = watcher.receiver_mut().unwrap();
    let mut events: Vec<WatchEvent> = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len(), THREADS * PER_THREAD * 2);
    assert!(events.windows(2).all(|pair| pair[0].zxid <= pair[1].zxid));
    for pair in events.chunks(2) {
        assert_eq!(pair[0].event_type, EventType::NodeCreated);
        assert_eq!(pair[1].event_type, EventType::NodeChildrenChanged);
        assert_eq!(pair[0].zxid, pair[1].zxid);
    }
    for writer in 0..THREADS {
        let prefix = format!("/w/t{writer}-");
        let created: Vec<&str> = events
            .iter()
            .filter(|e| e.event_type == EventType::NodeCreated && e.path.starts_with(&prefix))
            .map(|e| e.path.as_str())
            .collect();
        let mut sorted = created.clone();
        sorted.sort_unstable();
        assert_eq!(created.len(), PER_THREAD);
        assert_eq!(created, sorted);
    }
}
