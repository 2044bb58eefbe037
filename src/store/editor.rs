//! Editor
//!
//! Exclusive write handle for one key. Bytes go to a private staging file
//! that readers never see; `commit` publishes it atomically.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::key::CacheKey;

use super::{BlobStore, CommitOutcome};

/// Write-in-progress handle returned by [`BlobStore::edit`]
///
/// Dropping an editor without committing aborts it.
pub struct Editor<'a> {
    store: &'a BlobStore,
    key: CacheKey,
    staging: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
    finished: bool,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(store: &'a BlobStore, key: CacheKey, staging: PathBuf) -> Self {
        Self {
            store,
            key,
            staging,
            writer: None,
            written: 0,
            finished: false,
        }
    }

    /// Create the staging file
    pub(crate) fn open_staging(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.staging)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Bytes staged so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Publish the staged bytes as the CLEAN entry for this key
    ///
    /// On failure the edit is aborted and any prior CLEAN entry is untouched.
    pub fn commit(mut self) -> Result<CommitOutcome> {
        self.finished = true;

        if let Err(e) = self.finish_staging() {
            tracing::warn!("Staging write for {} failed: {}", self.key, e);
            self.store.abort_edit(&self.key, &self.staging);
            return Err(e);
        }

        self.store.commit_edit(&self.key, &self.staging, self.written)
    }

    /// Discard the staged bytes
    pub fn abort(mut self) {
        self.finished = true;
        self.writer = None;
        self.store.abort_edit(&self.key, &self.staging);
    }

    /// Flush and fsync the staging file, then close it
    fn finish_staging(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        Ok(())
    }
}

impl Write for Editor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "editor is not open"))?;
        let n = writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Editor<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Editor for {} dropped without commit, aborting", self.key);
            self.writer = None;
            self.store.abort_edit(&self.key, &self.staging);
        }
    }
}
