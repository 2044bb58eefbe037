//! Journal Recovery
//!
//! Reads back a journal after a restart or crash, cutting off a damaged tail.

use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::error::{CacheError, Result};

use super::{JournalHeader, JournalReader, JournalRecord};

/// Handles journal recovery after a crash
pub struct JournalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default)]
pub struct RecoveryResult {
    /// Number of records successfully recovered
    pub records_recovered: u64,

    /// Last valid LSN (0 if none)
    pub last_lsn: u64,

    /// Whether the file was truncated (damaged tail removed)
    pub was_truncated: bool,

    /// Byte length of the well-formed prefix
    pub valid_len: u64,

    /// Description of the damage that stopped the replay, if any
    pub corruption: Option<String>,
}

impl JournalRecovery {
    /// Recover records from a journal file
    ///
    /// This will:
    /// 1. Validate the header (a bad header is returned as an error)
    /// 2. Read records until end of file or the first damaged record
    /// 3. Truncate the file to the last well-formed record
    /// 4. Return the header and all valid records in order
    pub fn recover(path: &Path) -> Result<(JournalHeader, Vec<JournalRecord>, RecoveryResult)> {
        let (header, records, mut result) = Self::scan(path)?;

        let file_len = fs::metadata(path)?.len();
        if file_len > result.valid_len {
            tracing::warn!(
                "Journal {} damaged after {} records ({}), truncating {} bytes",
                path.display(),
                result.records_recovered,
                result.corruption.as_deref().unwrap_or("trailing bytes"),
                file_len - result.valid_len
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        Ok((header, records, result))
    }

    /// Verify integrity of a journal file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, _, result) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(JournalHeader, Vec<JournalRecord>, RecoveryResult)> {
        let mut reader = JournalReader::open(path)?;
        let header = reader.header();
        let mut records = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_record() {
                Ok(Some(record)) => {
                    result.last_lsn = record.lsn;
                    result.records_recovered += 1;
                    records.push(record);
                }
                Ok(None) => break,
                Err(CacheError::JournalCorruption(msg)) => {
                    result.corruption = Some(msg);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.valid_len = reader.position();
        Ok((header, records, result))
    }
}
