use bytes::Bytes;
use d_keeper::CreateMode;
use d_keeper::Error;
use d_keeper::KeeperError;
use d_keeper::OpResult;
use d_keeper::Operation;
use d_keeper::ANY_VERSION;

use crate::commons::connect;
use crate::commons::start_keeper;

#[test]
fn test_multi_create_then_set_data() {
    let keeper = start_keeper();
    let session = connect(&keeper);

    let results = keeper
        .submit_multi(
            session,
            vec![
                Operation::create("/m", "a", CreateMode::Persistent),
                Operation::set_data("/m", "b", 0),
            ],
        )
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(OpResult::is_ok));
    let (data, stat) = keeper.get_data("/m").unwrap();
    assert_eq!(data, Bytes::from("b"));
    assert_eq!(stat.version, 1);
}

#[test]
fn test_multi_with_bad_version_changes_nothing() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper
        .submit_multi(
            session,
            vec![
                Operation::create("/m", "a", CreateMode::Persistent),
                Operation::set_data("/m", "b", 0),
            ],
        )
        .unwrap();
    let zxid = keeper.last_zxid();

    let err = keeper
        .submit_multi(
            session,
            vec![Operation::set_data("/m", "c", 42), Operation::delete("/m", ANY_VERSION)],
        )
        .unwrap_err();

    match err {
        Error::Transaction(aborted) => {
            assert_eq!(aborted.index, 0);
            assert!(matches!(aborted.error, KeeperError::BadVersion { .. }));
            assert_eq!(
                aborted.results,
                vec![OpResult::Error { error: aborted.error.clone() }, OpResult::Aborted]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let (data, stat) = keeper.get_data("/m").unwrap();
    assert_eq!(data, Bytes::from("b"));
    assert_eq!(stat.version, 1);
    assert_eq!(keeper.last_zxid(), zxid);
}

#[test]
fn test_empty_multi_succeeds() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    let zxid = keeper.last_zxid();

    let results = keeper.submit_multi(session, Vec::new()).unwrap();

    assert!(results.is_empty());
    assert_eq!(keeper.last_zxid(), zxid);
}

#[test]
fn test_multi_builds_a_subtree_atomically() {
    let keeper = start_keeper();
    let session = connect(&keeper);

    keeper
        .submit_multi(
            session,
            vec![
                Operation::create("/cfg", "", CreateMode::Persistent),
                Operation::create("/cfg/a", "1", CreateMode::Persistent),
                Operation::create("/cfg/b", "2", CreateMode::Persistent),
            ],
        )
        .unwrap();

    let (children, stat) = keeper.get_children("/cfg").unwrap();
    assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(stat.pzxid, keeper.last_zxid());
}
