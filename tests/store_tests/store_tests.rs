//! BlobStore Tests
//!
//! Round trips, content addressing, LRU eviction, editor exclusivity and the
//! management operations.

use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;

use scopecache::store::{BlobStore, CommitOutcome, EntryState, StoreOptions, LOCK_FILENAME};
use scopecache::{derive_key, CacheError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(max_size: u64) -> (TempDir, BlobStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path(), 1, max_size).unwrap();
    (temp_dir, store)
}

fn blob(tag: u8, len: usize) -> Vec<u8> {
    vec![tag; len]
}

// =============================================================================
// Round Trip & Addressing
// =============================================================================

#[test]
fn test_insert_then_get_returns_same_bytes() {
    let (_temp, store) = open_store(1024);
    let data = b"hello blob".to_vec();
    let key = derive_key(&data);

    assert_eq!(store.insert(&key, &data).unwrap(), CommitOutcome::Stored);

    let read = store.get(&key).unwrap().unwrap();
    assert_eq!(&read[..], &data[..]);
    assert_eq!(store.state(&key), EntryState::Clean);
    assert_eq!(store.size(), data.len() as u64);
}

#[test]
fn test_get_absent_is_none() {
    let (_temp, store) = open_store(1024);
    assert!(store.get(&derive_key(b"missing")).unwrap().is_none());
    assert_eq!(store.state(&derive_key(b"missing")), EntryState::Removed);
}

#[test]
fn test_identical_bytes_stored_once() {
    let (temp, store) = open_store(1024);
    let data = blob(7, 100);
    let key = derive_key(&data);

    assert_eq!(store.insert(&key, &data).unwrap(), CommitOutcome::Stored);
    assert_eq!(store.insert(&key, &data).unwrap(), CommitOutcome::AlreadyPresent);

    assert_eq!(store.len(), 1);
    assert_eq!(store.size(), 100);
    let blob_files = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() != "journal")
        .count();
    assert_eq!(blob_files, 1);
}

#[test]
fn test_empty_blob_round_trip() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"");
    store.insert(&key, b"").unwrap();
    assert_eq!(store.get(&key).unwrap().unwrap().len(), 0);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_lru_eviction_keeps_total_within_budget() {
    let (_temp, store) = open_store(300);
    let keys: Vec<_> = (0..3u8)
        .map(|i| {
            let data = blob(i, 100);
            let key = derive_key(&data);
            store.insert(&key, &data).unwrap();
            key
        })
        .collect();

    // Touch the oldest so the second becomes least recently used.
    store.get(&keys[0]).unwrap().unwrap();

    let data = blob(9, 100);
    let newest = derive_key(&data);
    store.insert(&newest, &data).unwrap();

    assert!(store.size() <= 300);
    assert!(store.contains(&keys[0]));
    assert!(!store.contains(&keys[1]));
    assert!(store.contains(&keys[2]));
    assert!(store.contains(&newest));
    assert_eq!(store.stats().evictions, 1);
}

#[test]
fn test_keys_in_lru_order() {
    let (_temp, store) = open_store(1024);
    let a = derive_key(b"a");
    let b = derive_key(b"b");
    store.insert(&a, b"a").unwrap();
    store.insert(&b, b"b").unwrap();
    store.get(&a).unwrap();

    assert_eq!(store.keys(), vec![b, a]);
}

#[test]
fn test_set_max_size_evicts_immediately() {
    let (_temp, store) = open_store(1000);
    for i in 0..5u8 {
        let data = blob(i, 100);
        store.insert(&derive_key(&data), &data).unwrap();
    }
    assert_eq!(store.size(), 500);

    store.set_max_size(250).unwrap();

    assert_eq!(store.max_size(), 250);
    assert_eq!(store.len(), 2);
    assert!(store.size() <= 250);
}

#[test]
fn test_blob_over_limit_rejected() {
    let temp = TempDir::new().unwrap();
    let store =
        BlobStore::open_with(StoreOptions::new(temp.path(), 1, 1000).max_blob_size(10)).unwrap();

    let data = blob(1, 11);
    let key = derive_key(&data);
    let result = store.insert(&key, &data);

    assert!(matches!(
        result,
        Err(CacheError::BlobTooLarge { size: 11, limit: 10 })
    ));
    assert!(!store.contains(&key));

    // Streaming through an editor is checked at commit time.
    let mut editor = store.edit(&key).unwrap();
    editor.write_all(&data).unwrap();
    assert!(matches!(editor.commit(), Err(CacheError::BlobTooLarge { .. })));
    assert_eq!(store.state(&key), EntryState::Removed);
    assert!(!temp.path().join(format!("{}.tmp", key)).exists());
}

// =============================================================================
// Editors
// =============================================================================

#[test]
fn test_second_editor_fails_immediately() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"contended");

    let editor = store.edit(&key).unwrap();
    assert_eq!(store.state(&key), EntryState::Dirty);
    assert!(matches!(
        store.edit(&key),
        Err(CacheError::ConcurrentEdit { .. })
    ));

    editor.abort();
    assert!(store.edit(&key).is_ok());
}

#[test]
fn test_staged_bytes_invisible_until_commit() {
    let (temp, store) = open_store(1024);
    let key = derive_key(b"staged");

    let mut editor = store.edit(&key).unwrap();
    editor.write_all(b"staged").unwrap();
    editor.flush().unwrap();

    assert!(store.get(&key).unwrap().is_none());
    assert_eq!(store.size(), 0);
    assert!(temp.path().join(format!("{}.tmp", key)).exists());

    assert_eq!(editor.commit().unwrap(), CommitOutcome::Stored);
    assert_eq!(&store.get(&key).unwrap().unwrap()[..], b"staged");
    assert!(!temp.path().join(format!("{}.tmp", key)).exists());
}

#[test]
fn test_dropped_editor_aborts() {
    let (temp, store) = open_store(1024);
    let key = derive_key(b"dropped");

    {
        let mut editor = store.edit(&key).unwrap();
        editor.write_all(b"dropped").unwrap();
    }

    assert_eq!(store.state(&key), EntryState::Removed);
    assert!(!temp.path().join(format!("{}.tmp", key)).exists());
    assert!(store.edit(&key).is_ok());
}

#[test]
fn test_abort_keeps_prior_clean_entry() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"prior");
    store.insert(&key, b"prior").unwrap();

    let mut editor = store.edit(&key).unwrap();
    editor.write_all(b"something else").unwrap();
    editor.abort();

    assert_eq!(&store.get(&key).unwrap().unwrap()[..], b"prior");
}

#[test]
fn test_commit_over_existing_keeps_committed_bytes() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"immutable");
    store.insert(&key, b"immutable").unwrap();

    let mut editor = store.edit(&key).unwrap();
    editor.write_all(b"immutable").unwrap();
    assert_eq!(editor.commit().unwrap(), CommitOutcome::AlreadyPresent);
    assert_eq!(store.size(), 9);
}

#[test]
fn test_concurrent_editors_exactly_one_wins() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(BlobStore::open(temp.path(), 1, 1024).unwrap());
    let key = derive_key(b"race");
    let start = Arc::new(Barrier::new(8));
    let attempted = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = key.clone();
            let start = Arc::clone(&start);
            let attempted = Arc::clone(&attempted);
            thread::spawn(move || {
                start.wait();
                let result = store.edit(&key);
                // The winner holds its editor until every thread has tried.
                attempted.wait();
                match result {
                    Ok(mut editor) => {
                        editor.write_all(b"race").unwrap();
                        editor.commit().unwrap();
                        true
                    }
                    Err(CacheError::ConcurrentEdit { .. }) => false,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(&store.get(&key).unwrap().unwrap()[..], b"race");
}

#[test]
fn test_parallel_readers_see_full_blob() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(BlobStore::open(temp.path(), 1, 1 << 20).unwrap());
    let data = blob(42, 64 * 1024);
    let key = derive_key(&data);
    store.insert(&key, &data).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = key.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let read = store.get(&key).unwrap().unwrap();
                    assert_eq!(read.len(), 64 * 1024);
                    assert!(read.iter().all(|b| *b == 42));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.stats().hits, 160);
}

// =============================================================================
// Management
// =============================================================================

#[test]
fn test_remove_and_clear() {
    let (temp, store) = open_store(1024);
    let a = derive_key(b"a");
    let b = derive_key(b"b");
    store.insert(&a, b"a").unwrap();
    store.insert(&b, b"b").unwrap();

    assert!(store.remove(&a).unwrap());
    assert!(!store.remove(&a).unwrap());
    assert!(!temp.path().join(a.as_str()).exists());

    store.clear().unwrap();
    assert!(store.is_empty());
    assert_eq!(store.size(), 0);
    assert!(!temp.path().join(b.as_str()).exists());
}

#[test]
fn test_remove_skips_key_under_edit() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"busy");
    store.insert(&key, b"busy").unwrap();

    let editor = store.edit(&key).unwrap();
    assert!(!store.remove(&key).unwrap());
    drop(editor);
    assert!(store.remove(&key).unwrap());
}

#[test]
fn test_stats_track_hits_and_misses() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"s");
    store.insert(&key, b"s").unwrap();
    store.get(&key).unwrap();
    store.get(&derive_key(b"nope")).unwrap();

    let stats = store.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_size, 1);
    assert_eq!(stats.max_size, 1024);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.live_editors, 0);
}

#[test]
fn test_closed_store_rejects_operations() {
    let (_temp, store) = open_store(1024);
    let key = derive_key(b"c");
    store.insert(&key, b"c").unwrap();
    store.close().unwrap();

    assert!(store.is_closed());
    assert!(matches!(store.get(&key), Err(CacheError::Closed)));
    assert!(matches!(store.insert(&key, b"c"), Err(CacheError::Closed)));
    assert!(store.close().is_ok());
}

// =============================================================================
// Single Writer
// =============================================================================

#[test]
fn test_second_store_on_same_directory_is_refused() {
    let temp = TempDir::new().unwrap();
    let first = BlobStore::open(temp.path(), 1, 1024).unwrap();
    let key = derive_key(b"from-first");
    first.insert(&key, b"from-first").unwrap();

    let second = BlobStore::open(temp.path(), 1, 1024);
    assert!(matches!(second, Err(CacheError::DirectoryLocked(_))));

    // The refused open left the first store's data intact.
    assert_eq!(&first.get(&key).unwrap().unwrap()[..], b"from-first");
    drop(first);
    let reopened = BlobStore::open(temp.path(), 1, 1024).unwrap();
    assert!(reopened.contains(&key));
}

#[test]
fn test_close_releases_directory_lock() {
    let temp = TempDir::new().unwrap();
    let first = BlobStore::open(temp.path(), 1, 1024).unwrap();
    first.close().unwrap();

    let second = BlobStore::open(temp.path(), 1, 1024).unwrap();
    assert!(!second.is_closed());
    assert!(temp.path().join(LOCK_FILENAME).exists());
}

#[test]
fn test_lock_held_across_threads() {
    let temp = TempDir::new().unwrap();
    let _store = BlobStore::open(temp.path(), 1, 1024).unwrap();
    let dir = temp.path().to_path_buf();

    let refused = thread::spawn(move || BlobStore::open(dir, 1, 1024).is_err())
        .join()
        .unwrap();
    assert!(refused);
}
