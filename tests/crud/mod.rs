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
fn test_znode_lifecycle_version_sequence() {
    let keeper = start_keeper();
    let session = connect(&keeper);

    let (_, created) = keeper.create(session, "/x", "v0", CreateMode::Persistent).unwrap();
    let first = keeper.set_data(session, "/x", "v1", created.version).unwrap();
    let second = keeper.set_data(session, "/x", "v2", first.version).unwrap();
    keeper.delete(session, "/x", second.version).unwrap();

    assert_eq!(
        vec![created.version, first.version, second.version],
        vec![0, 1, 2]
    );
    assert_eq!(keeper.exists("/x").unwrap(), None);
}

#[test]
fn test_get_data_round_trips_written_bytes() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    let payload = Bytes::from_static(&[0, 1, 2, 255]);

    keeper.create(session, "/bin", payload.clone(), CreateMode::Persistent).unwrap();

    let (data, stat) = keeper.get_data("/bin").unwrap();
    assert_eq!(data, payload);
    assert_eq!(stat.version, 0);
}

#[test]
fn test_delete_updates_parent_children() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/dir", "", CreateMode::Persistent).unwrap();
    keeper.create(session, "/dir/a", "", CreateMode::Persistent).unwrap();
    keeper.create(session, "/dir/b", "", CreateMode::Persistent).unwrap();

    keeper.delete(session, "/dir/a", ANY_VERSION).unwrap();

    let (children, stat) = keeper.get_children("/dir").unwrap();
    assert_eq!(children, vec!["b".to_string()]);
    assert_eq!(stat.num_children, 1);
    assert_eq!(keeper.exists("/dir/a").unwrap(), None);
}

#[test]
fn test_submit_operation_reports_typed_errors() {
    let keeper = start_keeper();
    let session = connect(&keeper);

    let err = keeper
        .submit_operation(session, Operation::set_data("/missing", "x", ANY_VERSION))
        .unwrap_err();

    assert!(matches!(err, Error::Keeper(KeeperError::NoNode { .. })));
    assert_eq!(err.keeper_error().map(KeeperError::code), Some(-101));
}

#[test]
fn test_check_operation() {
    let keeper = start_keeper();
    let session = connect(&keeper);
    keeper.create(session, "/c", "", CreateMode::Persistent).unwrap();

    let ok = keeper.submit_operation(session, Operation::check("/c", 0)).unwrap();
    let err = keeper.submit_operation(session, Operation::check("/c", 1)).unwrap_err();

    assert_eq!(ok, OpResult::Check);
    assert!(matches!(err, Error::Keeper(KeeperError::BadVersion { .. })));
}
