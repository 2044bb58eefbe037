//! Blob Store
//!
//! Content-addressed disk cache with a journaled LRU index.
//!
//! ## Responsibilities
//! - Rebuild the index from the journal on open (with crash recovery)
//! - Hand out exclusive editors and publish their bytes atomically
//! - Keep the committed total under the size budget by evicting LRU entries
//! - Compact the journal once it is mostly redundant

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use fs2::FileExt;
use parking_lot::Mutex;

use crate::config::{Config, JournalSyncStrategy};
use crate::error::{CacheError, Result};
use crate::journal::{
    JournalOp, JournalRecord, JournalRecovery, JournalWriter, JOURNAL_FILENAME,
    JOURNAL_TEMP_FILENAME,
};
use crate::key::CacheKey;

use super::{CacheEntry, CacheStats, CommitOutcome, Editor, EntryState, LruIndex};

/// Extension of staging files
const STAGING_SUFFIX: &str = ".tmp";

/// Held exclusively by the one store writing a directory
pub const LOCK_FILENAME: &str = "scopecache.lock";

/// Options for opening a [`BlobStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub dir: PathBuf,
    pub schema_version: u32,
    pub max_size: u64,
    pub max_blob_size: Option<u64>,
    pub sync_strategy: JournalSyncStrategy,
    pub compaction_threshold: usize,
}

impl StoreOptions {
    pub fn new(dir: impl Into<PathBuf>, schema_version: u32, max_size: u64) -> Self {
        Self {
            dir: dir.into(),
            schema_version,
            max_size,
            max_blob_size: None,
            sync_strategy: JournalSyncStrategy::EveryNEntries { count: 100 },
            compaction_threshold: 2000,
        }
    }

    /// Options for the namespace described by `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.store_dir(),
            schema_version: config.schema_version,
            max_size: config.max_size,
            max_blob_size: config.max_blob_size,
            sync_strategy: config.journal_sync_strategy,
            compaction_threshold: config.compaction_threshold,
        }
    }

    pub fn max_blob_size(mut self, bytes: u64) -> Self {
        self.max_blob_size = Some(bytes);
        self
    }

    pub fn sync_strategy(mut self, strategy: JournalSyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    pub fn compaction_threshold(mut self, records: usize) -> Self {
        self.compaction_threshold = records;
        self
    }
}

/// Mutable state guarded by the store lock
struct StoreState {
    index: LruIndex,
    journal: JournalWriter,
    /// Keys with a live editor
    editing: HashSet<CacheKey>,
    /// Journal records not needed to describe the current index
    redundant_ops: usize,
    max_size: u64,
    closed: bool,
    /// Directory lock; released on close
    lock: Option<File>,
}

/// Content-addressed, size-bounded disk cache
///
/// ## Concurrency
/// One coarse lock per store guards the index, running size, journal writer
/// and the set of live editors. `get` holds it only to refresh recency and
/// open the backing file; the bytes are read after the lock is released.
///
/// ## Eviction while reading
/// Eviction unlinks files with a plain delete. A reader that already opened
/// the file keeps reading the unlinked inode (POSIX semantics); a reader that
/// loses the race sees the key as absent. There is no reference counting.
///
/// ## Single writer
/// An open store holds an exclusive lock on `scopecache.lock` in its
/// directory until it is closed or dropped. A second store for the same
/// directory, in this process or another, fails with `DirectoryLocked`.
pub struct BlobStore {
    dir: PathBuf,
    journal_path: PathBuf,
    schema_version: u32,
    max_blob_size: Option<u64>,
    sync_strategy: JournalSyncStrategy,
    compaction_threshold: usize,
    state: Mutex<StoreState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BlobStore {
    /// Open or create a store in `dir`
    pub fn open(dir: impl Into<PathBuf>, schema_version: u32, max_size: u64) -> Result<Self> {
        Self::open_with(StoreOptions::new(dir, schema_version, max_size))
    }

    /// Open or create a store with explicit options
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist and lock it
    /// 2. Replay the journal (wiping it on schema change or unreadable header)
    /// 3. Drop entries whose files are missing or the wrong size
    /// 4. Delete staging files and blob files the index does not reference
    /// 5. Rewrite the journal if anything was dropped
    ///
    /// Only names the store itself writes are ever deleted; other files in
    /// the directory are left alone.
    pub fn open_with(options: StoreOptions) -> Result<Self> {
        if options.max_size == 0 {
            return Err(CacheError::Config("max_size must be greater than zero".into()));
        }
        fs::create_dir_all(&options.dir)?;
        let lock = lock_directory(&options.dir)?;
        let journal_path = options.dir.join(JOURNAL_FILENAME);

        let (index, journal, redundant_ops) = Self::load(&options, &journal_path)?;

        tracing::info!(
            "Opened blob store {} ({} entries, {} bytes, budget {} bytes)",
            options.dir.display(),
            index.len(),
            index.total_size(),
            options.max_size
        );

        let store = Self {
            dir: options.dir,
            journal_path,
            schema_version: options.schema_version,
            max_blob_size: options.max_blob_size,
            sync_strategy: options.sync_strategy,
            compaction_threshold: options.compaction_threshold,
            state: Mutex::new(StoreState {
                index,
                journal,
                editing: HashSet::new(),
                redundant_ops,
                max_size: options.max_size,
                closed: false,
                lock: Some(lock),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        };

        // The budget may have shrunk since the last run.
        {
            let mut state = store.state.lock();
            store.evict(&mut state);
        }

        Ok(store)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the committed bytes for a key
    ///
    /// Returns `Ok(None)` when no CLEAN entry exists.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let (mut file, size) = {
            let mut state = self.state.lock();
            Self::ensure_open(&state)?;

            let (path, size) = match state.index.get(key) {
                Some(entry) => (entry.path.clone(), entry.size),
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            };

            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::warn!("Backing file for {} disappeared, dropping entry", key);
                    self.drop_entry(&mut state, key);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            state.index.touch(key);
            self.append(&mut state, JournalOp::Read { key: key.clone() })?;
            self.maybe_compact(&mut state);
            (file, size)
        };

        let mut buf = Vec::with_capacity(size as usize);
        (&mut file).take(size + 1).read_to_end(&mut buf)?;

        if buf.len() as u64 != size {
            tracing::warn!(
                "Backing file for {} has {} bytes, journal says {}; dropping entry",
                key,
                buf.len(),
                size
            );
            let mut state = self.state.lock();
            if state.index.get(key).map(|e| e.size) == Some(size) {
                self.drop_entry(&mut state, key);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Bytes::from(buf)))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().index.contains(key)
    }

    /// Snapshot of a committed entry
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().index.get(key).cloned()
    }

    pub fn state(&self, key: &CacheKey) -> EntryState {
        let state = self.state.lock();
        if state.index.contains(key) {
            EntryState::Clean
        } else if state.editing.contains(key) {
            EntryState::Dirty
        } else {
            EntryState::Removed
        }
    }

    /// Committed keys from least to most recently used
    pub fn keys(&self) -> Vec<CacheKey> {
        self.state
            .lock()
            .index
            .iter_lru()
            .map(|entry| entry.key.clone())
            .collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Open an editor for `key`
    ///
    /// Fails immediately with `ConcurrentEdit` if another editor for the same
    /// key is live; callers that want to wait must retry.
    pub fn edit(&self, key: &CacheKey) -> Result<Editor<'_>> {
        {
            let mut state = self.state.lock();
            Self::ensure_open(&state)?;

            if !state.editing.insert(key.clone()) {
                return Err(CacheError::ConcurrentEdit {
                    key: key.to_string(),
                });
            }
            if let Err(e) = self.append(&mut state, JournalOp::Dirty { key: key.clone() }) {
                state.editing.remove(key);
                return Err(e);
            }
        }

        let mut editor = Editor::new(self, key.clone(), self.staging_path(key));
        // A failed open drops the editor, which aborts it.
        editor.open_staging()?;
        Ok(editor)
    }

    /// Store `data` under `key`
    ///
    /// An existing CLEAN entry short-circuits without any file I/O and only
    /// refreshes recency.
    pub fn insert(&self, key: &CacheKey, data: &[u8]) -> Result<CommitOutcome> {
        {
            let mut state = self.state.lock();
            Self::ensure_open(&state)?;

            if state.index.touch(key) {
                self.append(&mut state, JournalOp::Read { key: key.clone() })?;
                self.maybe_compact(&mut state);
                tracing::debug!("{} already cached, refreshed recency", key);
                return Ok(CommitOutcome::AlreadyPresent);
            }

            let limit = self.blob_limit(state.max_size);
            if data.len() as u64 > limit {
                return Err(CacheError::BlobTooLarge {
                    size: data.len() as u64,
                    limit,
                });
            }
        }

        let mut editor = self.edit(key)?;
        editor.write_all(data)?;
        editor.commit()
    }

    /// Remove a committed entry
    ///
    /// Returns false if the key is absent or currently being edited.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        if state.editing.contains(key) {
            return Ok(false);
        }
        let entry = match state.index.remove(key) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        remove_file_if_exists(&entry.path);
        self.append(&mut state, JournalOp::Remove { key: key.clone() })?;
        self.maybe_compact(&mut state);
        tracing::debug!("Removed {} ({} bytes)", key, entry.size);
        Ok(true)
    }

    /// Remove every committed entry
    ///
    /// Live editors are unaffected and may still commit afterwards.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        let removed = state.index.drain();
        for entry in &removed {
            remove_file_if_exists(&entry.path);
        }
        self.rebuild_journal(&mut state)?;
        tracing::info!("Cleared {} entries from {}", removed.len(), self.dir.display());
        Ok(())
    }

    /// Change the size budget, evicting immediately if needed
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        if max_size == 0 {
            return Err(CacheError::Config("max_size must be greater than zero".into()));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.max_size = max_size;
        self.evict(&mut state);
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Force journal records to stable storage
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.journal.sync()
    }

    /// Flush and close the journal; later operations fail with `Closed`
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.journal.sync()?;
        state.closed = true;
        state.lock = None;
        tracing::info!("Closed blob store {}", self.dir.display());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Total committed bytes
    pub fn size(&self) -> u64 {
        self.state.lock().index.total_size()
    }

    pub fn max_size(&self) -> u64 {
        self.state.lock().max_size
    }

    /// Largest blob a commit will accept
    pub fn max_blob_size(&self) -> u64 {
        let max_size = self.state.lock().max_size;
        self.blob_limit(max_size)
    }

    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().index.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.index.len(),
            total_size: state.index.total_size(),
            max_size: state.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            live_editors: state.editing.len(),
        }
    }

    // =========================================================================
    // Editor callbacks
    // =========================================================================

    /// Publish a staged file (called by `Editor::commit`)
    pub(crate) fn commit_edit(
        &self,
        key: &CacheKey,
        staging: &Path,
        size: u64,
    ) -> Result<CommitOutcome> {
        let mut state = self.state.lock();
        state.editing.remove(key);

        if state.closed {
            remove_file_if_exists(staging);
            return Err(CacheError::Closed);
        }

        // Committed bytes are immutable: keep the existing copy.
        if let Some(existing) = state.index.get(key).map(|e| e.size) {
            remove_file_if_exists(staging);
            state.index.touch(key);
            self.append(&mut state, JournalOp::Clean { key: key.clone(), size: existing })?;
            self.maybe_compact(&mut state);
            tracing::debug!("{} already committed, discarded staged copy", key);
            return Ok(CommitOutcome::AlreadyPresent);
        }

        let limit = self.blob_limit(state.max_size);
        if size > limit {
            remove_file_if_exists(staging);
            self.append_quietly(&mut state, JournalOp::Remove { key: key.clone() });
            return Err(CacheError::BlobTooLarge { size, limit });
        }

        let path = self.blob_path(key);
        if let Err(e) = fs::rename(staging, &path) {
            tracing::warn!("Failed to publish {}: {}", key, e);
            remove_file_if_exists(staging);
            self.append_quietly(&mut state, JournalOp::Remove { key: key.clone() });
            return Err(e.into());
        }

        if let Err(e) = self.append(&mut state, JournalOp::Clean { key: key.clone(), size }) {
            // Without a CLEAN record the file would be swept on the next open.
            remove_file_if_exists(&path);
            return Err(e);
        }

        state.index.insert(key.clone(), size, path);
        tracing::debug!(
            "Committed {} ({} bytes, total {} of {})",
            key,
            size,
            state.index.total_size(),
            state.max_size
        );

        self.evict(&mut state);
        self.maybe_compact(&mut state);
        Ok(CommitOutcome::Stored)
    }

    /// Discard a staged file (called by `Editor::abort` and on drop)
    pub(crate) fn abort_edit(&self, key: &CacheKey, staging: &Path) {
        remove_file_if_exists(staging);

        let mut state = self.state.lock();
        state.editing.remove(key);
        if state.closed {
            return;
        }

        // Resolve the DIRTY record without disturbing a prior CLEAN entry.
        let op = match state.index.get(key) {
            Some(entry) => JournalOp::Clean {
                key: key.clone(),
                size: entry.size,
            },
            None => JournalOp::Remove { key: key.clone() },
        };
        self.append_quietly(&mut state, op);
        tracing::debug!("Aborted edit of {}", key);
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(state: &StoreState) -> Result<()> {
        if state.closed {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    fn blob_limit(&self, max_size: u64) -> u64 {
        match self.max_blob_size {
            Some(limit) => limit.min(max_size),
            None => max_size,
        }
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    fn staging_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}{}", key, STAGING_SUFFIX))
    }

    fn append(&self, state: &mut StoreState, op: JournalOp) -> Result<()> {
        state.journal.append(op)?;
        state.redundant_ops += 1;
        Ok(())
    }

    fn append_quietly(&self, state: &mut StoreState, op: JournalOp) {
        let key = op.key().clone();
        if let Err(e) = self.append(state, op) {
            tracing::warn!("Failed to journal {}: {}", key, e);
        }
    }

    /// Drop an entry whose backing file is unusable
    fn drop_entry(&self, state: &mut StoreState, key: &CacheKey) {
        if let Some(entry) = state.index.remove(key) {
            remove_file_if_exists(&entry.path);
            self.append_quietly(state, JournalOp::Remove { key: key.clone() });
        }
    }

    /// Evict least recently used entries until the budget holds
    fn evict(&self, state: &mut StoreState) {
        while state.index.total_size() > state.max_size {
            let victim = match state.index.pop_lru() {
                Some(victim) => victim,
                None => break,
            };
            remove_file_if_exists(&victim.path);
            self.append_quietly(state, JournalOp::Remove { key: victim.key.clone() });
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Evicted {} ({} bytes, total now {})",
                victim.key,
                victim.size,
                state.index.total_size()
            );
        }
    }

    fn maybe_compact(&self, state: &mut StoreState) {
        if state.redundant_ops >= self.compaction_threshold
            && state.redundant_ops >= state.index.len()
        {
            if let Err(e) = self.rebuild_journal(state) {
                tracing::warn!("Journal compaction failed, keeping old journal: {}", e);
            }
        }
    }

    /// Rewrite the journal to describe only the current state
    fn rebuild_journal(&self, state: &mut StoreState) -> Result<()> {
        let ops = snapshot_ops(&state.index, state.editing.iter());
        let records = ops.len();
        state.journal =
            JournalWriter::rewrite(&self.journal_path, self.schema_version, ops, self.sync_strategy)?;
        tracing::debug!(
            "Compacted journal: {} redundant records dropped, {} kept",
            state.redundant_ops,
            records
        );
        state.redundant_ops = 0;
        Ok(())
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Rebuild the index from disk, returning it with an append-ready journal
    fn load(options: &StoreOptions, journal_path: &Path) -> Result<(LruIndex, JournalWriter, usize)> {
        if !journal_path.exists() {
            let journal =
                JournalWriter::create(journal_path, options.schema_version, options.sync_strategy)?;
            return Ok((LruIndex::new(), journal, 0));
        }

        let (header, records, result) = match JournalRecovery::recover(journal_path) {
            Ok(recovered) => recovered,
            Err(CacheError::JournalCorruption(msg)) => {
                tracing::warn!(
                    "Journal in {} is unreadable ({}), discarding cache",
                    options.dir.display(),
                    msg
                );
                return Self::start_fresh(options, journal_path);
            }
            Err(e) => return Err(e),
        };

        if header.schema_version != options.schema_version {
            tracing::info!(
                "Schema version changed from {} to {}, discarding previous generation in {}",
                header.schema_version,
                options.schema_version,
                options.dir.display()
            );
            return Self::start_fresh(options, journal_path);
        }

        let record_count = records.len();
        let (mut index, abandoned) = replay(&options.dir, records);

        // Abandoned edits never became visible; only their staging files remain.
        for key in &abandoned {
            tracing::debug!("Discarding abandoned edit of {}", key);
            remove_file_if_exists(&options.dir.join(format!("{}{}", key, STAGING_SUFFIX)));
        }

        let mut dropped = 0usize;
        let snapshot: Vec<(CacheKey, PathBuf, u64)> = index
            .iter_lru()
            .map(|e| (e.key.clone(), e.path.clone(), e.size))
            .collect();
        for (key, path, size) in snapshot {
            let actual = fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len());
            if actual != Some(size) {
                tracing::warn!(
                    "Dropping {}: expected {} bytes on disk, found {:?}",
                    key,
                    size,
                    actual
                );
                index.remove(&key);
                dropped += 1;
            }
        }

        sweep_unreferenced(&options.dir, &index);

        let redundant = record_count.saturating_sub(index.len());
        let needs_rewrite = result.was_truncated
            || dropped > 0
            || !abandoned.is_empty()
            || (redundant >= options.compaction_threshold && redundant >= index.len());

        if needs_rewrite {
            let journal = JournalWriter::rewrite(
                journal_path,
                options.schema_version,
                snapshot_ops(&index, std::iter::empty()),
                options.sync_strategy,
            )?;
            Ok((index, journal, 0))
        } else {
            let journal =
                JournalWriter::open_append(journal_path, result.last_lsn + 1, options.sync_strategy)?;
            Ok((index, journal, redundant))
        }
    }

    /// Delete everything the store owns and start an empty journal
    fn start_fresh(
        options: &StoreOptions,
        journal_path: &Path,
    ) -> Result<(LruIndex, JournalWriter, usize)> {
        wipe_dir(&options.dir)?;
        let journal =
            JournalWriter::create(journal_path, options.schema_version, options.sync_strategy)?;
        Ok((LruIndex::new(), journal, 0))
    }
}

impl Drop for BlobStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed {
            if let Err(e) = state.journal.sync() {
                tracing::warn!("Failed to sync journal for {}: {}", self.dir.display(), e);
            }
        }
    }
}

/// Apply journal records in order
///
/// Returns the CLEAN index and the keys whose last DIRTY record was never
/// resolved by a CLEAN or REMOVE.
fn replay(dir: &Path, records: Vec<JournalRecord>) -> (LruIndex, Vec<CacheKey>) {
    let mut index = LruIndex::new();
    let mut pending: HashSet<CacheKey> = HashSet::new();

    for record in records {
        match record.op {
            JournalOp::Dirty { key } => {
                pending.insert(key);
            }
            JournalOp::Clean { key, size } => {
                pending.remove(&key);
                let path = dir.join(key.as_str());
                index.insert(key, size, path);
            }
            JournalOp::Remove { key } => {
                pending.remove(&key);
                index.remove(&key);
            }
            JournalOp::Read { key } => {
                index.touch(&key);
            }
        }
    }

    let mut abandoned: Vec<CacheKey> = pending.into_iter().collect();
    abandoned.sort();
    (index, abandoned)
}

/// Journal ops describing `index` (LRU order) plus open editors
fn snapshot_ops<'a>(
    index: &LruIndex,
    editing: impl Iterator<Item = &'a CacheKey>,
) -> Vec<JournalOp> {
    let mut ops: Vec<JournalOp> = index
        .iter_lru()
        .map(|entry| JournalOp::Clean {
            key: entry.key.clone(),
            size: entry.size,
        })
        .collect();
    ops.extend(editing.map(|key| JournalOp::Dirty { key: key.clone() }));
    ops
}

/// Take the directory lock, failing if another store holds it
fn lock_directory(dir: &Path) -> Result<File> {
    let path = dir.join(LOCK_FILENAME);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            tracing::warn!("{} is already open in another store", dir.display());
            Err(CacheError::DirectoryLocked(dir.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Files the store creates: blobs, staging files and the journal
///
/// The lock file is not one of them; it is never deleted.
fn is_owned_name(name: &str) -> bool {
    if name == JOURNAL_FILENAME || name == JOURNAL_TEMP_FILENAME {
        return true;
    }
    let key = name.strip_suffix(STAGING_SUFFIX).unwrap_or(name);
    CacheKey::parse(key).is_ok()
}

/// Delete staging files and unreferenced blob files
///
/// Files with names the store never writes are not touched.
fn sweep_unreferenced(dir: &Path, index: &LruIndex) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot scan {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == JOURNAL_FILENAME || !is_owned_name(&name) {
            continue;
        }
        let referenced = CacheKey::parse(&name)
            .map(|key| index.contains(&key))
            .unwrap_or(false);
        if !referenced {
            tracing::debug!("Sweeping unreferenced file {}", path.display());
            remove_file_if_exists(&path);
        }
    }
}

/// Delete every file the store owns, keeping foreign files and directories
fn wipe_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file() && is_owned_name(&name) {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
    }
}
