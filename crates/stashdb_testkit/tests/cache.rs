//! Visibility rules of cached collections.

use stashdb_core::{RecordStore, TransactionState};
use stashdb_storage::{CacheDecorator, FileBackend, JsonFormat, PathLocks};
use stashdb_testkit::crash::CrashImage;
use stashdb_testkit::{FaultyStore, Pojo, TestDatabase};
use std::sync::Arc;

fn one(value: i32) -> Pojo {
    Pojo::with_id("1", value)
}

#[test]
fn uncommitted_writes_are_invisible() {
    let test_db = TestDatabase::cached();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    pojos.save(&mut one(1)).unwrap();

    let mut tx = test_db.begin();
    pojos.save_in_tx(&mut tx, &mut one(2)).unwrap();
    pojos.save_in_tx(&mut tx, &mut Pojo::with_id("2", 2)).unwrap();
    tx.commit().unwrap();

    // written to disk, not yet visible
    assert!(test_db.raw("pojos", "1").unwrap().contains("\"intValue\":2"));
    assert_eq!(pojos.find_one(&"1".to_string()), Some(one(1)));
    assert!(!pojos.exists_by_id(&"2".to_string()));

    tx.close();
    assert_eq!(pojos.find_one(&"1".to_string()), Some(one(2)));
    assert!(pojos.exists_by_id(&"2".to_string()));
    assert_eq!(pojos.count().unwrap(), 2);
}

#[test]
fn rollback_leaves_cache_untouched() {
    let test_db = TestDatabase::cached();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    pojos.save(&mut one(1)).unwrap();

    let mut tx = test_db.begin();
    pojos.save_in_tx(&mut tx, &mut one(2)).unwrap();
    pojos.delete_by_id_in_tx(&mut tx, &"1".to_string()).unwrap();
    pojos.save_in_tx(&mut tx, &mut Pojo::with_id("3", 3)).unwrap();
    tx.commit().unwrap();
    tx.rollback().unwrap();
    tx.close();

    assert_eq!(pojos.find_all().unwrap(), vec![one(1)]);
    assert_eq!(test_db.files("pojos"), vec!["1.json"]);
}

#[test]
fn delete_is_visible_after_close() {
    let test_db = TestDatabase::cached();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    pojos.save(&mut one(1)).unwrap();

    let mut tx = test_db.begin();
    pojos.delete_in_tx(&mut tx, &one(1)).unwrap();
    tx.commit().unwrap();
    assert!(pojos.exists_by_id(&"1".to_string()));

    tx.close();
    assert!(!pojos.exists_by_id(&"1".to_string()));
    assert_eq!(pojos.count().unwrap(), 0);
}

#[test]
fn outside_file_changes_need_a_reopen() {
    let mut test_db = TestDatabase::cached();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    pojos.save(&mut one(1)).unwrap();

    let image = CrashImage::new(test_db.root());
    image.write_record(
        "pojos",
        "1",
        &serde_json::json!({"id": "1", "intValue": 5, "stringValue": "5"}),
    );
    assert_eq!(pojos.find_one(&"1".to_string()).unwrap().int_value, 1);

    test_db.reopen();
    let pojos = test_db.register::<Pojo>("pojos").unwrap();
    assert_eq!(pojos.find_one(&"1".to_string()).unwrap().int_value, 5);
}

#[test]
fn cached_and_uncached_agree() {
    let plain = TestDatabase::new();
    let cached = TestDatabase::cached();

    let mut results = Vec::new();
    for test_db in [&plain, &cached] {
        let pojos = test_db.register::<Pojo>("pojos").unwrap();
        let mut batch: Vec<Pojo> = (1..=5).map(Pojo::new).collect();
        pojos.save_all(&mut batch).unwrap();
        pojos.delete_by_id(&"2".to_string()).unwrap();
        batch[3].int_value = 40;
        pojos.save(&mut batch[3]).unwrap();
        pojos.delete_all_of(&batch[4..]).unwrap();
        results.push(pojos.find_all().unwrap());
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(
        results[0].iter().map(|p| p.int_value).collect::<Vec<_>>(),
        vec![1, 3, 40]
    );
}

#[test]
fn unrecoverable_transaction_leaves_no_parked_changes() {
    let test_db = TestDatabase::new();
    let backend: FileBackend<Pojo> = FileBackend::open(
        test_db.collection_path("pojos"),
        Arc::new(JsonFormat::compact()),
        PathLocks::global(),
    )
    .unwrap();
    let faulty = Arc::new(FaultyStore::new(Arc::new(backend) as Arc<dyn RecordStore<Pojo>>));
    let cache = Arc::new(CacheDecorator::new(Arc::clone(&faulty)).unwrap());
    let pojos = test_db
        .register_with_store::<Pojo>("pojos", Arc::clone(&cache) as Arc<dyn RecordStore<Pojo>>)
        .unwrap();
    pojos.save(&mut one(1)).unwrap();

    faulty.fail_every_nth_write(2);
    faulty.fail_rollbacks(true);
    let mut tx = test_db.begin();
    pojos.save_in_tx(&mut tx, &mut one(2)).unwrap();
    pojos.save_in_tx(&mut tx, &mut Pojo::with_id("2", 2)).unwrap();
    assert!(tx.commit().unwrap_err().is_unrecoverable());
    assert_eq!(tx.state(), TransactionState::Unrecoverable);
    // the first save reached the disk and was parked
    assert_eq!(cache.pending_operations(), 1);
    tx.close();

    assert_eq!(cache.pending_operations(), 0);
    assert_eq!(pojos.find_one(&"1".to_string()), Some(one(1)));
    assert!(!pojos.exists_by_id(&"2".to_string()));
    assert_eq!(test_db.redo_entries().len(), 1);

    faulty.disarm();
    assert_eq!(test_db.recover().unwrap().replayed, 1);
    assert_eq!(cache.pending_operations(), 0);
    assert_eq!(pojos.find_one(&"1".to_string()), Some(one(2)));
    assert!(pojos.exists_by_id(&"2".to_string()));
    assert!(test_db.shadow_files("pojos").is_empty());
    assert!(test_db.redo_entries().is_empty());
}
