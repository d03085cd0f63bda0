use super::*;

use serde::Deserialize;
use serde_json::json;

use crate::storage::MemoryStorage;
use crate::storage::test_helpers::ReadOnlyStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    id: String,
}

fn entry(id: &str) -> Entry {
    Entry { id: id.to_owned() }
}

fn memory() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStorage::new())
}

fn slot<T: DeserializeOwned>(storage: &Arc<dyn KeyValueStore>, key: &str) -> T {
    let raw = storage.get(key).unwrap().expect("slot should be written");
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn missing_slot_seeds_with_initial() {
    let storage = memory();
    let store = create_local_store(Arc::clone(&storage), "likedBooks", vec![entry("seed")]).unwrap();
    assert_eq!(store.get(), vec![entry("seed")]);
}

#[test]
fn construction_writes_seed_back() {
    let storage = memory();
    let _store = create_local_store::<Vec<Entry>>(Arc::clone(&storage), "likedBooks", Vec::new()).unwrap();
    assert_eq!(storage.get("likedBooks").unwrap().as_deref(), Some("[]"));
}

#[test]
fn existing_slot_wins_over_initial() {
    let storage = memory();
    storage.set("readlistBooks", r#"[{"id":"b7"}]"#).unwrap();

    let store = create_local_store(Arc::clone(&storage), "readlistBooks", vec![entry("ignored")]).unwrap();
    assert_eq!(store.get(), vec![entry("b7")]);
}

#[test]
fn empty_slot_counts_as_absent() {
    let storage = memory();
    storage.set("likedBooks", "").unwrap();

    let store = create_local_store(Arc::clone(&storage), "likedBooks", vec![entry("fresh")]).unwrap();
    assert_eq!(store.get(), vec![entry("fresh")]);
}

#[test]
fn set_writes_through() {
    let storage = memory();
    let store = create_local_store::<Vec<Entry>>(Arc::clone(&storage), "likedBooks", Vec::new()).unwrap();

    store.set(vec![entry("b1"), entry("b2")]).unwrap();
    let persisted: Vec<Entry> = slot(&storage, "likedBooks");
    assert_eq!(persisted, vec![entry("b1"), entry("b2")]);
}

#[test]
fn repeated_identical_set_is_harmless() {
    let storage = memory();
    let store = create_local_store(Arc::clone(&storage), "count", 0_u32).unwrap();

    store.set(5).unwrap();
    store.set(5).unwrap();
    assert_eq!(slot::<u32>(&storage, "count"), 5);
}

#[test]
fn update_writes_through() {
    let storage = memory();
    let store = create_local_store(Arc::clone(&storage), "names", vec!["a".to_owned()]).unwrap();

    store
        .update(|names| {
            let mut next = names.clone();
            next.push("b".to_owned());
            next
        })
        .unwrap();
    assert_eq!(slot::<Vec<String>>(&storage, "names"), vec!["a", "b"]);
}

#[test]
fn second_store_on_same_key_sees_earlier_write() {
    let storage = memory();
    let first = create_local_store::<Vec<Entry>>(Arc::clone(&storage), "likedBooks", Vec::new()).unwrap();
    assert!(first.get().is_empty());

    first.set(vec![entry("b1")]).unwrap();
    assert_eq!(slot::<serde_json::Value>(&storage, "likedBooks"), json!([{ "id": "b1" }]));

    let second = create_local_store::<Vec<Entry>>(Arc::clone(&storage), "likedBooks", Vec::new()).unwrap();
    assert_eq!(second.get(), vec![entry("b1")]);
}

#[test]
fn stores_on_same_key_keep_separate_values_and_last_write_wins() {
    let storage = memory();
    let a = create_local_store(Arc::clone(&storage), "shared", 0_i32).unwrap();
    let b = create_local_store(Arc::clone(&storage), "shared", 0_i32).unwrap();

    a.set(1).unwrap();
    b.set(2).unwrap();

    assert_eq!(a.get(), 1);
    assert_eq!(b.get(), 2);
    assert_eq!(slot::<i32>(&storage, "shared"), 2);
}

#[test]
fn normalizing_listener_leaves_slot_and_observers_on_final_value() {
    let storage = memory();
    let store = create_local_store(Arc::clone(&storage), "pageLimit", 0_u32).unwrap();
    let handle = store.clone();
    let _clamp = store.subscribe(move |v: &u32| if *v > 10 { handle.set(10) } else { Ok(()) }).unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _late = store
        .subscribe(move |v: &u32| {
            sink.lock().unwrap().push(*v);
            Ok(())
        })
        .unwrap();

    store.set(50).unwrap();

    assert_eq!(store.get(), 10);
    assert_eq!(slot::<u32>(&storage, "pageLimit"), 10);
    assert_eq!(*seen.lock().unwrap(), vec![0, 50, 10]);
}

#[test]
fn concurrent_sets_leave_slot_equal_to_value() {
    let storage = memory();
    let store = create_local_store(Arc::clone(&storage), "counter", 0_u64).unwrap();

    let workers: Vec<_> = (1..=4_u64)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    store.set(t * 1_000 + i).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(slot::<u64>(&storage, "counter"), store.get());
}

#[test]
fn undecodable_slot_is_an_error() {
    let storage = memory();
    storage.set("readlistBooks", "definitely not json").unwrap();

    let err = create_local_store::<Vec<Entry>>(Arc::clone(&storage), "readlistBooks", Vec::new()).unwrap_err();
    assert!(matches!(err, StoreError::Deserialization { ref key, .. } if key == "readlistBooks"));
    // The slot is left untouched.
    assert_eq!(storage.get("readlistBooks").unwrap().as_deref(), Some("definitely not json"));
}

#[test]
fn wrong_shape_is_an_error() {
    let storage = memory();
    storage.set("likedBooks", r#"{"id":"b1"}"#).unwrap();

    let err = create_local_store::<Vec<Entry>>(storage, "likedBooks", Vec::new()).unwrap_err();
    assert!(matches!(err, StoreError::Deserialization { .. }));
}

#[test]
fn or_initial_recovers_from_undecodable_slot() {
    let storage = memory();
    storage.set("readlistBooks", "{{{").unwrap();

    let store =
        create_local_store_or_initial::<Vec<Entry>>(Arc::clone(&storage), "readlistBooks", Vec::new()).unwrap();
    assert!(store.get().is_empty());
    assert_eq!(storage.get("readlistBooks").unwrap().as_deref(), Some("[]"));
}

#[test]
fn or_initial_keeps_valid_slot() {
    let storage = memory();
    storage.set("readlistBooks", r#"[{"id":"b3"}]"#).unwrap();

    let store =
        create_local_store_or_initial::<Vec<Entry>>(Arc::clone(&storage), "readlistBooks", Vec::new()).unwrap();
    assert_eq!(store.get(), vec![entry("b3")]);
}

#[test]
fn unavailable_storage_fails_construction() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(ReadOnlyStorage::default());
    let err = create_local_store(storage, "likedBooks", 0_u8).unwrap_err();
    assert!(matches!(err, StoreError::StorageUnavailable { .. }));
}

#[test]
fn write_failure_surfaces_from_set() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn KeyValueStore> =
        Arc::new(crate::storage::FileStorage::open(dir.path(), Some(32)).unwrap());
    let store = create_local_store(Arc::clone(&storage), "k", String::new()).unwrap();

    let err = store.set("y".repeat(100)).unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded { .. }));
    assert_eq!(storage.get("k").unwrap().as_deref(), Some(r#""""#));
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let storage: Arc<dyn KeyValueStore> = Arc::new(crate::storage::FileStorage::open(dir.path(), None).unwrap());
        let store = create_local_store::<Vec<Entry>>(storage, "likedBooks", Vec::new()).unwrap();
        store.set(vec![entry("b9")]).unwrap();
    }

    let storage: Arc<dyn KeyValueStore> = Arc::new(crate::storage::FileStorage::open(dir.path(), None).unwrap());
    let store = create_local_store::<Vec<Entry>>(storage, "likedBooks", Vec::new()).unwrap();
    assert_eq!(store.get(), vec![entry("b9")]);
}
