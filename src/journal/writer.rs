//! Journal Writer
//!
//! Appends records to the journal file and rewrites it during compaction.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::JournalSyncStrategy;
use crate::error::Result;

use super::{JournalHeader, JournalOp, JournalRecord};

/// Writes records to the journal file
///
/// Each record is handed to the OS with a single `write_all`, so a process
/// crash never leaves a record sitting in a user-space buffer. `sync_strategy`
/// only controls how often the data is forced to stable storage.
pub struct JournalWriter {
    path: PathBuf,
    file: File,
    next_lsn: u64,
    sync_strategy: JournalSyncStrategy,
    unsynced: usize,
}

impl JournalWriter {
    /// Create (or truncate) a journal and write its header
    pub fn create(
        path: &Path,
        schema_version: u32,
        sync_strategy: JournalSyncStrategy,
    ) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&JournalHeader::new(schema_version).encode())?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn: 1,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Open an existing, already recovered journal for appending
    pub fn open_append(
        path: &Path,
        next_lsn: u64,
        sync_strategy: JournalSyncStrategy,
    ) -> Result<Self> {
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn: next_lsn.max(1),
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Replace the journal at `path` with one containing exactly `ops`
    ///
    /// The new journal is written to a sibling temp file, synced, then renamed
    /// over the old one, so a crash leaves either the old or the new journal.
    pub fn rewrite<I>(
        path: &Path,
        schema_version: u32,
        ops: I,
        sync_strategy: JournalSyncStrategy,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = JournalOp>,
    {
        let tmp_path = temp_path(path);
        let mut writer = Self::create(&tmp_path, schema_version, JournalSyncStrategy::EveryNEntries {
            count: usize::MAX,
        })?;
        for op in ops {
            writer.append(op)?;
        }
        writer.sync()?;

        fs::rename(&tmp_path, path)?;
        sync_parent_dir(path);

        // The open handle follows the renamed inode.
        writer.path = path.to_path_buf();
        writer.sync_strategy = sync_strategy;
        Ok(writer)
    }

    /// Append a record, returning its LSN
    pub fn append(&mut self, op: JournalOp) -> Result<u64> {
        let lsn = self.next_lsn;
        let bytes = JournalRecord::new(lsn, op).serialize()?;
        self.file.write_all(&bytes)?;
        self.next_lsn += 1;
        self.unsynced += 1;

        match self.sync_strategy {
            JournalSyncStrategy::EveryWrite => self.sync()?,
            JournalSyncStrategy::EveryNEntries { count } => {
                if self.unsynced >= count {
                    self.sync()?;
                }
            }
        }
        Ok(lsn)
    }

    /// Force buffered records to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN that the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Records appended since the last sync
    pub fn unsynced(&self) -> usize {
        self.unsynced
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `journal` → `journal.tmp`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
