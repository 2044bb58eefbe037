//! BlobStore Recovery Tests
//!
//! Reopening a store after clean shutdowns and simulated crashes:
//! - committed entries and recency survive
//! - abandoned edits and orphan files are swept
//! - entries whose files are missing or resized are dropped
//! - a damaged journal tail is cut off, a damaged header wipes the store
//! - a schema version change discards the previous generation

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use scopecache::config::JournalSyncStrategy;
use scopecache::journal::{JournalOp, JournalRecovery, JournalWriter};
use scopecache::store::{BlobStore, StoreOptions};
use scopecache::{derive_key, CacheKey};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn options(dir: &Path) -> StoreOptions {
    StoreOptions::new(dir, 1, 1024).sync_strategy(JournalSyncStrategy::EveryWrite)
}

fn insert(store: &BlobStore, data: &[u8]) -> CacheKey {
    let key = derive_key(data);
    store.insert(&key, data).unwrap();
    key
}

fn journal_path(dir: &Path) -> std::path::PathBuf {
    dir.join("journal")
}

// =============================================================================
// Reopen
// =============================================================================

#[test]
fn test_committed_entries_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let (a, b) = {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        let a = insert(&store, b"first");
        let b = insert(&store, b"second");
        store.close().unwrap();
        (a, b)
    };

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.size(), 11);
    assert_eq!(&store.get(&a).unwrap().unwrap()[..], b"first");
    assert_eq!(&store.get(&b).unwrap().unwrap()[..], b"second");
}

#[test]
fn test_recency_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let (a, b) = {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        let a = insert(&store, b"a");
        let b = insert(&store, b"b");
        store.get(&a).unwrap();
        (a, b)
    };

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(store.keys(), vec![b, a]);
}

#[test]
fn test_uncommitted_edit_is_discarded_after_crash() {
    let temp = TempDir::new().unwrap();
    let committed;
    let abandoned = derive_key(b"never committed");
    {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        committed = insert(&store, b"kept");
        let mut editor = store.edit(&abandoned).unwrap();
        editor.write_all(b"never committed").unwrap();
        editor.flush().unwrap();
        // Simulate process death: neither commit nor abort runs.
        std::mem::forget(editor);
    }
    assert!(temp.path().join(format!("{}.tmp", abandoned)).exists());

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert!(store.contains(&committed));
    assert!(!store.contains(&abandoned));
    assert!(!temp.path().join(format!("{}.tmp", abandoned)).exists());

    // The abandoned DIRTY record is gone from the rewritten journal.
    let (_, records, _) = JournalRecovery::recover(&journal_path(temp.path())).unwrap();
    assert!(records
        .iter()
        .all(|r| !matches!(&r.op, JournalOp::Dirty { key } if *key == abandoned)));
}

#[test]
fn test_abandoned_edit_keeps_prior_clean_entry() {
    let temp = TempDir::new().unwrap();
    let key;
    {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        key = insert(&store, b"prior");
        let editor = store.edit(&key).unwrap();
        std::mem::forget(editor);
    }

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(&store.get(&key).unwrap().unwrap()[..], b"prior");
}

#[test]
fn test_missing_blob_file_is_dropped() {
    let temp = TempDir::new().unwrap();
    let (gone, kept) = {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        (insert(&store, b"gone"), insert(&store, b"kept"))
    };
    fs::remove_file(temp.path().join(gone.as_str())).unwrap();

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert!(!store.contains(&gone));
    assert!(store.contains(&kept));
    assert_eq!(store.size(), 4);
}

#[test]
fn test_resized_blob_file_is_dropped() {
    let temp = TempDir::new().unwrap();
    let key = {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        insert(&store, b"original")
    };
    fs::write(temp.path().join(key.as_str()), b"tampered with").unwrap();

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert!(store.get(&key).unwrap().is_none());
    assert!(!temp.path().join(key.as_str()).exists());
}

#[test]
fn test_unreferenced_files_are_swept() {
    let temp = TempDir::new().unwrap();
    {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        insert(&store, b"real");
    }
    let orphan = derive_key(b"orphan");
    let staging = format!("{}.tmp", derive_key(b"staged"));
    fs::write(temp.path().join(orphan.as_str()), b"orphan").unwrap();
    fs::write(temp.path().join(&staging), b"x").unwrap();
    fs::write(temp.path().join("journal.tmp"), b"half written").unwrap();

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(store.len(), 1);
    assert!(!temp.path().join(orphan.as_str()).exists());
    assert!(!temp.path().join(&staging).exists());
    assert!(!temp.path().join("journal.tmp").exists());
}

#[test]
fn test_fresh_open_leaves_existing_files_alone() {
    let temp = TempDir::new().unwrap();
    let blob_named = derive_key(b"predates the store");
    fs::write(temp.path().join("notes.txt"), b"user data").unwrap();
    fs::write(temp.path().join(blob_named.as_str()), b"predates the store").unwrap();
    fs::create_dir(temp.path().join("photos")).unwrap();
    fs::write(temp.path().join("photos").join("a.jpg"), b"jpg").unwrap();

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert!(store.is_empty());
    assert_eq!(fs::read(temp.path().join("notes.txt")).unwrap(), b"user data");
    assert!(temp.path().join(blob_named.as_str()).exists());
    assert!(temp.path().join("photos").join("a.jpg").exists());
}

#[test]
fn test_sweep_spares_foreign_files() {
    let temp = TempDir::new().unwrap();
    {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        insert(&store, b"real");
    }
    fs::write(temp.path().join("notes.txt"), b"user data").unwrap();
    fs::write(temp.path().join("stray.tmp"), b"not ours").unwrap();

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(store.len(), 1);
    assert!(temp.path().join("notes.txt").exists());
    assert!(temp.path().join("stray.tmp").exists());
}

#[test]
fn test_shrunk_budget_evicts_on_open() {
    let temp = TempDir::new().unwrap();
    {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        for i in 0..4u8 {
            insert(&store, &[i; 100]);
        }
    }

    let store = BlobStore::open(temp.path(), 1, 250).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.size() <= 250);
}

// =============================================================================
// Journal Damage
// =============================================================================

#[test]
fn test_damaged_journal_tail_is_truncated() {
    let temp = TempDir::new().unwrap();
    let key = {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        insert(&store, b"survivor")
    };
    let mut file = OpenOptions::new()
        .append(true)
        .open(journal_path(temp.path()))
        .unwrap();
    file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01]).unwrap();
    drop(file);

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(&store.get(&key).unwrap().unwrap()[..], b"survivor");

    let result = JournalRecovery::verify(&journal_path(temp.path())).unwrap();
    assert!(result.corruption.is_none());
}

#[test]
fn test_bad_journal_header_wipes_store() {
    let temp = TempDir::new().unwrap();
    let key = {
        let store = BlobStore::open_with(options(temp.path())).unwrap();
        insert(&store, b"doomed")
    };
    fs::write(journal_path(temp.path()), b"garbage header").unwrap();

    fs::write(temp.path().join("notes.txt"), b"user data").unwrap();
    fs::create_dir(temp.path().join("nested")).unwrap();

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert!(store.is_empty());
    assert!(!temp.path().join(key.as_str()).exists());
    assert!(temp.path().join("notes.txt").exists());
    assert!(temp.path().join("nested").is_dir());

    // The store is usable again.
    let fresh = insert(&store, b"fresh");
    assert!(store.contains(&fresh));
}

#[test]
fn test_schema_version_change_discards_generation() {
    let temp = TempDir::new().unwrap();
    let key = {
        let store = BlobStore::open(temp.path(), 1, 1024).unwrap();
        insert(&store, b"old generation")
    };

    let store = BlobStore::open(temp.path(), 2, 1024).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.schema_version(), 2);
    assert!(!temp.path().join(key.as_str()).exists());

    let (header, _, _) = JournalRecovery::recover(&journal_path(temp.path())).unwrap();
    assert_eq!(header.schema_version, 2);
}

#[test]
fn test_replay_of_handwritten_journal() {
    let temp = TempDir::new().unwrap();
    let a = derive_key(b"aaa");
    let b = derive_key(b"bb");
    fs::write(temp.path().join(a.as_str()), b"aaa").unwrap();
    fs::write(temp.path().join(b.as_str()), b"bb").unwrap();
    {
        let mut writer = JournalWriter::create(
            &journal_path(temp.path()),
            1,
            JournalSyncStrategy::EveryWrite,
        )
        .unwrap();
        writer.append(JournalOp::Dirty { key: a.clone() }).unwrap();
        writer.append(JournalOp::Clean { key: a.clone(), size: 3 }).unwrap();
        writer.append(JournalOp::Dirty { key: b.clone() }).unwrap();
        writer.append(JournalOp::Clean { key: b.clone(), size: 2 }).unwrap();
        writer.append(JournalOp::Remove { key: b.clone() }).unwrap();
    }

    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(store.keys(), vec![a]);
    assert_eq!(store.size(), 3);
    assert!(!temp.path().join(b.as_str()).exists());
}

// =============================================================================
// Compaction
// =============================================================================

#[test]
fn test_journal_compacts_when_mostly_redundant() {
    let temp = TempDir::new().unwrap();
    let store = BlobStore::open_with(options(temp.path()).compaction_threshold(20)).unwrap();
    let key = insert(&store, b"hot");

    for _ in 0..100 {
        store.get(&key).unwrap();
    }

    let (_, records, _) = JournalRecovery::recover(&journal_path(temp.path())).unwrap();
    assert!(records.len() < 30, "journal not compacted: {} records", records.len());
    assert!(!temp.path().join("journal.tmp").exists());

    drop(store);
    let store = BlobStore::open_with(options(temp.path())).unwrap();
    assert_eq!(&store.get(&key).unwrap().unwrap()[..], b"hot");
}
