use chrono::Utc;
use home_triage::config::StoreConfig;
use home_triage::workflows::evaluation::{Address, AddressKey};
use home_triage::workflows::pipeline::{
    FileWorkItemStore, LockOutcome, Phase, RepositoryError, WorkItem, WorkItemStore,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn store_config(dir: &Path, stale_lock: Duration) -> StoreConfig {
    StoreConfig {
        data_dir: dir.to_path_buf(),
        stale_lock,
        max_backups: 3,
    }
}

fn item(street: &str) -> WorkItem {
    WorkItem::new(Address::new(street, "Phoenix", "AZ", "85028"), Utc::now())
}

#[test]
fn failed_save_leaves_previous_file_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(3_600));
    let store = FileWorkItemStore::new(&config);
    let original = item("4417 E Sunnyside Dr");
    store.save(&original).expect("first save");
    let before = std::fs::read(config.work_items_path()).expect("read store");

    // A plain file where the backup directory should go makes the snapshot step fail.
    std::fs::write(config.backup_dir(), b"").expect("block backup dir");
    let mut changed = original.clone();
    changed.complete(Phase::CountyData, 0, Utc::now());
    let err = store.save(&changed).expect_err("save must fail");

    assert!(matches!(err, RepositoryError::Io { .. }), "{err}");
    let after = std::fs::read(config.work_items_path()).expect("read store");
    assert_eq!(before, after);
    let reloaded = store.fetch(&original.key).expect("fetch").expect("item");
    assert_eq!(reloaded, original);
}

#[test]
fn corrupt_store_is_reported_and_restorable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(3_600));
    let store = FileWorkItemStore::new(&config);
    let first = item("1 Ash Ave");
    store.save(&first).expect("save first");
    store.save(&item("2 Birch Blvd")).expect("save second");
    std::fs::write(config.work_items_path(), b"{ truncated").expect("corrupt file");

    let err = store.load_all().expect_err("corrupt file");
    assert!(matches!(err, RepositoryError::Corrupt { .. }), "{err}");

    let restored = store.restore_from_backup(None).expect("restore newest");
    assert!(restored.starts_with(config.backup_dir()));
    let collection = store.load_all().expect("restored store loads");
    assert_eq!(collection.items.len(), 1);
    assert!(collection.items.contains_key(&first.key));
}

#[test]
fn backups_are_pruned_to_the_configured_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(3_600));
    let store = FileWorkItemStore::new(&config);

    let streets = [
        "1 Ash Ave",
        "2 Birch Blvd",
        "3 Cedar Ct",
        "4 Dogwood Dr",
        "5 Elm St",
        "6 Fir Way",
    ];
    for street in streets {
        store.save(&item(street)).expect("save");
    }

    let backups = store.backups().expect("list backups");
    assert_eq!(backups.len(), config.max_backups);
}

#[test]
fn restore_without_backups_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileWorkItemStore::new(&store_config(dir.path(), Duration::from_secs(3_600)));

    let err = store.restore_from_backup(None).expect_err("nothing to restore");

    assert!(matches!(err, RepositoryError::NoBackup(_)), "{err}");
}

#[test]
fn locks_are_shared_through_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(3_600));
    let first = FileWorkItemStore::new(&config);
    let second = FileWorkItemStore::new(&config);
    let work_item = item("4417 E Sunnyside Dr");
    first.save(&work_item).expect("save");

    let acquired = first
        .acquire_lock(&work_item.key, "run-a", Utc::now())
        .expect("lock");
    let contended = second
        .acquire_lock(&work_item.key, "run-b", Utc::now())
        .expect("lock attempt");

    assert_eq!(acquired, LockOutcome::Acquired);
    assert!(matches!(contended, LockOutcome::Held { ref holder, .. } if holder == "run-a"));
    let err = second.save(&work_item).expect_err("write under foreign lock");
    assert!(matches!(err, RepositoryError::LockHeld { .. }), "{err}");

    second
        .release_lock(&work_item.key, "run-b")
        .expect("foreign release is a no-op");
    let still_held = second
        .acquire_lock(&work_item.key, "run-b", Utc::now())
        .expect("lock attempt");
    assert!(!still_held.is_acquired());

    first.release_lock(&work_item.key, "run-a").expect("release");
    let retried = second
        .acquire_lock(&work_item.key, "run-b", Utc::now())
        .expect("lock");
    assert_eq!(retried, LockOutcome::Acquired);
}

#[test]
fn stale_locks_are_reclaimed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(60));
    let store = FileWorkItemStore::new(&config);
    let work_item = item("4417 E Sunnyside Dr");
    store.save(&work_item).expect("save");
    let long_ago = Utc::now() - chrono::Duration::minutes(10);
    store
        .acquire_lock(&work_item.key, "crashed-run", long_ago)
        .expect("lock");

    let outcome = store
        .acquire_lock(&work_item.key, "new-run", Utc::now())
        .expect("lock");

    assert_eq!(
        outcome,
        LockOutcome::Reclaimed {
            previous_holder: "crashed-run".to_string()
        }
    );
}

fn race<T, F>(config: &StoreConfig, holders: [&'static str; 2], work: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(&FileWorkItemStore, &'static str) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(holders.len()));
    let work = Arc::new(work);
    let handles: Vec<_> = holders
        .into_iter()
        .map(|holder| {
            let store = FileWorkItemStore::new(config);
            let barrier = Arc::clone(&barrier);
            let work = Arc::clone(&work);
            thread::spawn(move || {
                barrier.wait();
                (*work)(&store, holder)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().expect("racing store thread"))
        .collect()
}

#[test]
fn separate_store_instances_never_both_win_a_lock() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(3_600));
    let seeding = FileWorkItemStore::new(&config);
    let keys: Arc<Vec<AddressKey>> = Arc::new(
        (0..40)
            .map(|number| {
                let work_item = item(&format!("{number} Relay Rd"));
                seeding.save(&work_item).expect("seed");
                work_item.key
            })
            .collect(),
    );

    let racing_keys = Arc::clone(&keys);
    let won = race(&config, ["run-a", "run-b"], move |store, holder| {
        racing_keys
            .iter()
            .map(|key| {
                store
                    .acquire_lock(key, holder, Utc::now())
                    .map(|outcome| outcome.is_acquired())
            })
            .collect::<Result<Vec<bool>, RepositoryError>>()
            .expect("no store errors while racing")
    });

    let collection = seeding.load_all().expect("load");
    for (index, key) in keys.iter().enumerate() {
        assert!(won[0][index] != won[1][index], "exactly one run holds {key}");
        let expected = if won[0][index] { "run-a" } else { "run-b" };
        let lock = collection
            .get(key)
            .and_then(|stored| stored.lock.clone())
            .expect("locked");
        assert_eq!(lock.holder, expected);
    }
}

#[test]
fn concurrent_writers_keep_each_others_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = store_config(dir.path(), Duration::from_secs(3_600));

    let saved = race(&config, ["run-a", "run-b"], |store, holder| {
        (0..20)
            .map(|number| {
                let work_item = item(&format!("{number} {holder} Loop"));
                store.save(&work_item).map(|()| work_item.key)
            })
            .collect::<Result<Vec<AddressKey>, RepositoryError>>()
            .expect("no store errors while racing")
    });

    let collection = FileWorkItemStore::new(&config).load_all().expect("load");
    assert_eq!(collection.items.len(), 40);
    for key in saved.iter().flatten() {
        assert!(collection.items.contains_key(key), "{key} was lost");
    }
}
