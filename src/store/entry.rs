//! Store entry types

use std::path::PathBuf;

use crate::key::CacheKey;

/// Lifecycle state of a key in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// An editor is open and no committed bytes exist yet
    Dirty,

    /// Committed bytes are readable
    Clean,

    /// No committed bytes (never written, evicted, or deleted)
    Removed,
}

/// Metadata for one committed blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,

    /// Committed size in bytes
    pub size: u64,

    /// Access sequence; lower means less recently used
    pub sequence: u64,

    pub state: EntryState,

    /// Backing file
    pub path: PathBuf,
}

/// What a commit did with the staged bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The bytes were published as a new CLEAN entry
    Stored,

    /// The key was already CLEAN; the staged copy was discarded and only
    /// recency was refreshed
    AlreadyPresent,
}

/// Statistics about a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub live_editors: usize,
}
