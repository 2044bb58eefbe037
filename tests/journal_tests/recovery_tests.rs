//! Tests for Journal Recovery
//!
//! These tests verify:
//! - Recovery from a clean journal
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted records (CRC mismatch)
//! - Header validation (magic, schema version)
//! - Rewrite (compaction) and append-after-recovery

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use scopecache::config::JournalSyncStrategy;
use scopecache::journal::{
    JournalOp, JournalReader, JournalRecord, JournalRecovery, JournalWriter, FILE_HEADER_SIZE,
};
use scopecache::{derive_key, CacheError, CacheKey};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_journal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("journal");
    (temp_dir, path)
}

fn key(i: usize) -> CacheKey {
    derive_key(format!("blob{}", i).as_bytes())
}

/// Write CLEAN records using JournalWriter (produces a well-formed journal)
fn write_records(path: &PathBuf, count: usize) {
    let mut writer = JournalWriter::create(path, 1, JournalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(JournalOp::Clean {
                key: key(i),
                size: i as u64,
            })
            .unwrap();
    }
}

fn append_raw(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Clean Journals
// =============================================================================

#[test]
fn test_recover_header_only() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 0);

    let (header, records, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(header.schema_version, 1);
    assert!(records.is_empty());
    assert_eq!(result.records_recovered, 0);
    assert_eq!(result.last_lsn, 0);
    assert_eq!(result.valid_len, FILE_HEADER_SIZE);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_records_in_order() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 10);

    let (_, records, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(records.len(), 10);
    assert_eq!(result.records_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);
    assert!(result.corruption.is_none());

    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.lsn, (i + 1) as u64);
        assert_eq!(
            record.op,
            JournalOp::Clean {
                key: key(i),
                size: i as u64
            }
        );
    }
}

#[test]
fn test_recover_preserves_operations() {
    let (_temp, path) = setup_temp_journal();
    let k = key(0);

    {
        let mut writer = JournalWriter::create(&path, 3, JournalSyncStrategy::EveryWrite).unwrap();
        writer.append(JournalOp::Dirty { key: k.clone() }).unwrap();
        writer.append(JournalOp::Clean { key: k.clone(), size: 5 }).unwrap();
        writer.append(JournalOp::Read { key: k.clone() }).unwrap();
        writer.append(JournalOp::Remove { key: k.clone() }).unwrap();
    }

    let (header, records, _) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(header.schema_version, 3);
    assert!(matches!(records[0].op, JournalOp::Dirty { .. }));
    assert!(matches!(records[1].op, JournalOp::Clean { size: 5, .. }));
    assert!(matches!(records[2].op, JournalOp::Read { .. }));
    assert!(matches!(records[3].op, JournalOp::Remove { .. }));
    assert!(records.iter().all(|r| r.op.key() == &k));
}

// =============================================================================
// Damaged Tails
// =============================================================================

#[test]
fn test_recover_partial_record_truncates() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 3);
    let good_len = fs::metadata(&path).unwrap().len();

    let partial = JournalRecord::new(4, JournalOp::Remove { key: key(0) })
        .serialize()
        .unwrap();
    append_raw(&path, &partial[..partial.len() / 2]);

    let (_, records, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(records.len(), 3);
    assert!(result.was_truncated);
    assert_eq!(result.valid_len, good_len);
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
}

#[test]
fn test_recover_partial_header_truncates() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 2);
    append_raw(&path, &[0xAB; 7]);

    let (_, records, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(records.len(), 2);
    assert!(result.was_truncated);
    assert!(result.corruption.is_some());
}

#[test]
fn test_recover_crc_mismatch_stops_replay() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 2);
    let good_len = fs::metadata(&path).unwrap().len();

    let mut bad = JournalRecord::new(3, JournalOp::Remove { key: key(1) })
        .serialize()
        .unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;
    append_raw(&path, &bad);
    write_more_after_damage(&path);

    let (_, records, result) = JournalRecovery::recover(&path).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(result.last_lsn, 2);
    assert!(result.corruption.as_deref().unwrap().contains("CRC"));
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
}

/// A valid record after the damage is discarded too: replay stops at the first bad record
fn write_more_after_damage(path: &PathBuf) {
    let good = JournalRecord::new(4, JournalOp::Read { key: key(0) })
        .serialize()
        .unwrap();
    append_raw(path, &good);
}

#[test]
fn test_verify_does_not_modify() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 2);
    append_raw(&path, &[1, 2, 3]);
    let len = fs::metadata(&path).unwrap().len();

    let result = JournalRecovery::verify(&path).unwrap();

    assert_eq!(result.records_recovered, 2);
    assert!(!result.was_truncated);
    assert!(result.valid_len < len);
    assert_eq!(fs::metadata(&path).unwrap().len(), len);
}

// =============================================================================
// Header Validation
// =============================================================================

#[test]
fn test_bad_magic_is_corruption() {
    let (_temp, path) = setup_temp_journal();
    let mut file = File::create(&path).unwrap();
    file.write_all(b"NOPE\x01\x00\x01\x00\x00\x00").unwrap();

    let result = JournalRecovery::recover(&path);
    assert!(matches!(result, Err(CacheError::JournalCorruption(_))));
}

#[test]
fn test_empty_file_is_corruption() {
    let (_temp, path) = setup_temp_journal();
    File::create(&path).unwrap();

    assert!(matches!(
        JournalReader::open(&path),
        Err(CacheError::JournalCorruption(_))
    ));
}

// =============================================================================
// Writer Behaviour
// =============================================================================

#[test]
fn test_open_append_continues_lsn() {
    let (_temp, path) = setup_temp_journal();
    write_records(&path, 3);

    let (_, _, result) = JournalRecovery::recover(&path).unwrap();
    {
        let mut writer =
            JournalWriter::open_append(&path, result.last_lsn + 1, JournalSyncStrategy::EveryWrite)
                .unwrap();
        assert_eq!(writer.append(JournalOp::Read { key: key(0) }).unwrap(), 4);
    }

    let (_, records, _) = JournalRecovery::recover(&path).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[3].lsn, 4);
}

#[test]
fn test_rewrite_replaces_contents() {
    let (temp, path) = setup_temp_journal();
    write_records(&path, 50);

    let ops = vec![JournalOp::Clean {
        key: key(7),
        size: 7,
    }];
    {
        let mut writer =
            JournalWriter::rewrite(&path, 1, ops, JournalSyncStrategy::EveryWrite).unwrap();
        assert_eq!(writer.current_lsn(), 2);
        writer.append(JournalOp::Read { key: key(7) }).unwrap();
    }

    let (_, records, result) = JournalRecovery::recover(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(!result.was_truncated);
    assert!(!temp.path().join("journal.tmp").exists());
}

#[test]
fn test_every_n_entries_sync_counter() {
    let (_temp, path) = setup_temp_journal();
    let mut writer =
        JournalWriter::create(&path, 1, JournalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(JournalOp::Read { key: key(0) }).unwrap();
    writer.append(JournalOp::Read { key: key(0) }).unwrap();
    assert_eq!(writer.unsynced(), 2);
    writer.append(JournalOp::Read { key: key(0) }).unwrap();
    assert_eq!(writer.unsynced(), 0);
}
