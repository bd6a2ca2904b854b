//! Recovery of operations interrupted by a crash.

use serde_json::{json, Value};
use stashdb_core::{CoreError, RecordStore};
use stashdb_storage::{FileBackend, JsonFormat, PathLocks};
use stashdb_testkit::crash::{composite, delete, save, CrashImage, CrashPoint};
use stashdb_testkit::{FaultyStore, Pojo, TestDatabase};
use std::sync::Arc;

fn pojo_json(id: &str, value: i32) -> Value {
    json!({ "id": id, "intValue": value, "stringValue": value.to_string() })
}

/// A database with pojos 1 and 2 committed, then closed.
fn crashed_db() -> (TestDatabase, CrashImage) {
    let test_db = TestDatabase::new();
    let image = CrashImage::new(test_db.root());
    image.write_record("pojos", "1", &pojo_json("1", 1));
    image.write_record("pojos", "2", &pojo_json("2", 2));
    (test_db, image)
}

fn recover(test_db: &mut TestDatabase) -> stashdb_core::Collection<Pojo> {
    test_db.reopen();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    test_db.recover().unwrap();
    pojos
}

fn values(pojos: &stashdb_core::Collection<Pojo>) -> Vec<(String, i32)> {
    pojos
        .find_all()
        .unwrap()
        .into_iter()
        .map(|p| (p.key(), p.int_value))
        .collect()
}

#[test]
fn save_interrupted_after_backup_rolls_forward() {
    let (mut test_db, image) = crashed_db();
    image.interrupted_save(5, "pojos", "1", &pojo_json("1", 10));

    let pojos = recover(&mut test_db);

    assert_eq!(values(&pojos), vec![("1".into(), 10), ("2".into(), 2)]);
    assert!(test_db.shadow_files("pojos").is_empty());
    assert!(test_db.redo_entries().is_empty());
}

#[test]
fn delete_interrupted_after_commit_completes() {
    let (mut test_db, image) = crashed_db();
    image.interrupt(3, &delete("pojos", "2"), CrashPoint::AfterCommit);
    assert_eq!(test_db.shadow_files("pojos"), vec!["2.json.old"]);

    let pojos = recover(&mut test_db);

    assert_eq!(values(&pojos), vec![("1".into(), 1)]);
    assert!(test_db.shadow_files("pojos").is_empty());
    assert!(test_db.redo_entries().is_empty());
}

#[test]
fn create_interrupted_after_begin_is_applied() {
    let (mut test_db, image) = crashed_db();
    image.interrupt(1, &save("pojos", "3", &pojo_json("3", 3)), CrashPoint::AfterBegin);

    let pojos = recover(&mut test_db);

    assert_eq!(pojos.count().unwrap(), 3);
    assert!(test_db.redo_entries().is_empty());
}

#[test]
fn composite_interrupted_mid_commit_completes() {
    let (mut test_db, image) = crashed_db();
    let command = composite(vec![
        save("pojos", "1", &pojo_json("1", 11)),
        delete("pojos", "2"),
        save("pojos", "3", &pojo_json("3", 33)),
    ]);
    image.interrupt(9, &command, CrashPoint::AfterBackup);
    image.apply(&command, Some(1));

    test_db.reopen();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    let report = test_db.recover().unwrap();

    assert_eq!(report.replayed, 1);
    assert_eq!(report.composite, 1);
    assert_eq!(values(&pojos), vec![("1".into(), 11), ("3".into(), 33)]);
    assert!(test_db.shadow_files("pojos").is_empty());
    assert!(test_db.redo_entries().is_empty());
}

#[test]
fn replay_is_idempotent() {
    let command = composite(vec![save("pojos", "1", &pojo_json("1", 7)), delete("pojos", "2")]);

    // crash once, recover
    let (mut once, image) = crashed_db();
    image.interrupt(4, &command, CrashPoint::AfterBackup);
    let pojos = recover(&mut once);
    let expected = values(&pojos);

    // crash, then crash again in the middle of the replay, recover
    let (mut twice, image) = crashed_db();
    image.interrupt(4, &command, CrashPoint::AfterBackup);
    image.apply(&command, Some(1));
    let pojos = recover(&mut twice);

    assert_eq!(values(&pojos), expected);
    assert_eq!(expected, vec![("1".into(), 7)]);
    assert!(twice.shadow_files("pojos").is_empty());

    // recovering an already recovered database changes nothing
    assert!(twice.recover().unwrap().is_clean());
    assert_eq!(values(&pojos), expected);
}

#[test]
fn entries_replay_in_operation_order() {
    let (mut test_db, image) = crashed_db();
    image.interrupt(2, &save("pojos", "1", &pojo_json("1", 20)), CrashPoint::AfterBegin);
    image.interrupt(10, &save("pojos", "1", &pojo_json("1", 100)), CrashPoint::AfterBegin);

    let pojos = recover(&mut test_db);

    assert_eq!(pojos.find_one(&"1".to_string()).unwrap().int_value, 100);
}

#[test]
fn new_operations_do_not_reuse_pending_ids() {
    let (mut test_db, image) = crashed_db();
    image.interrupt(41, &save("pojos", "1", &pojo_json("1", 5)), CrashPoint::AfterBegin);
    test_db.reopen();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();

    let mut tx = test_db.begin();
    pojos.save_in_tx(&mut tx, &mut Pojo::new(3)).unwrap();
    tx.commit().unwrap();
    assert!(tx.op_id().unwrap().as_u64() > 41);
    tx.close();

    test_db.recover().unwrap();
    assert!(test_db.redo_entries().is_empty());
}

#[test]
fn stale_staging_files_are_removed() {
    let (mut test_db, image) = crashed_db();
    image.write_redo_staging(6, "{ half");

    test_db.reopen();
    test_db.register::<Pojo>("pojos").unwrap();
    let report = test_db.recover().unwrap();

    assert_eq!(report.staging_removed, 1);
    assert_eq!(report.replayed, 0);
    assert!(test_db.redo_entries().is_empty());
}

#[test]
fn cached_collection_sees_recovered_state() {
    let mut test_db = TestDatabase::cached();
    let image = CrashImage::new(test_db.root());
    image.write_record("pojos", "1", &pojo_json("1", 1));
    image.interrupt(3, &save("pojos", "1", &pojo_json("1", 2)), CrashPoint::AfterCommit);
    image.interrupt(4, &delete("pojos", "1"), CrashPoint::AfterBegin);
    image.interrupt(5, &save("pojos", "9", &pojo_json("9", 9)), CrashPoint::AfterBackup);

    let pojos = recover(&mut test_db);

    assert_eq!(values(&pojos), vec![("9".into(), 9)]);
    assert!(test_db.shadow_files("pojos").is_empty());
}

#[test]
fn recovery_needs_registered_collections() {
    let (mut test_db, image) = crashed_db();
    image.interrupted_save(1, "pojos", "1", &pojo_json("1", 3));
    test_db.reopen();

    assert!(matches!(test_db.recover(), Err(CoreError::InvalidOperation { .. })));
    assert_eq!(test_db.redo_entries().len(), 1);
}

#[test]
fn failed_entries_are_reported_together() {
    let (mut test_db, image) = crashed_db();
    image.interrupted_save(1, "ghosts", "1", &json!({}));
    image.interrupted_save(2, "pojos", "1", &pojo_json("1", 12));
    image.interrupted_save(3, "phantoms", "1", &json!({}));

    test_db.reopen();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();

    match test_db.recover().unwrap_err() {
        CoreError::Aggregate { errors, .. } => assert_eq!(errors.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
    // the entry that could be replayed was
    assert_eq!(pojos.find_one(&"1".to_string()).unwrap().int_value, 12);
    assert_eq!(test_db.redo_entries(), vec!["1.json", "3.json"]);
}

#[test]
fn failed_replay_rolls_back_to_pre_image() {
    let (mut test_db, image) = crashed_db();
    image.interrupted_save(7, "pojos", "1", &pojo_json("1", 2));

    test_db.reopen();
    let backend: FileBackend<Pojo> = FileBackend::open(
        test_db.collection_path("pojos"),
        Arc::new(JsonFormat::compact()),
        PathLocks::global(),
    )
    .unwrap();
    let faulty = Arc::new(FaultyStore::new(Arc::new(backend) as Arc<dyn RecordStore<Pojo>>));
    let pojos = test_db
        .register_with_store::<Pojo>("pojos", Arc::clone(&faulty) as Arc<dyn RecordStore<Pojo>>)
        .unwrap();
    faulty.fail_every_nth_write(1);

    let err = test_db.recover().unwrap_err();
    match &err {
        CoreError::Aggregate { errors, .. } => assert_eq!(errors.len(), 1),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_unrecoverable());
    assert_eq!(faulty.injected(), 1);

    // the rollback restored the pre-image and finished the operation
    assert_eq!(test_db.files("pojos"), vec!["1.json", "2.json"]);
    assert!(test_db.shadow_files("pojos").is_empty());
    assert!(test_db.redo_entries().is_empty());
    assert_eq!(pojos.find_one(&"1".to_string()).unwrap().int_value, 1);
}
