//! Journal Module
//!
//! Append-only log of entry lifecycle transitions. Replaying it rebuilds the
//! LRU index after a restart without rescanning blob contents.
//!
//! ## Responsibilities
//! - Append DIRTY/CLEAN/REMOVE/READ records as the store changes
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Recovery with tail truncation, and compaction by rewrite
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header                                  │
//! │ ┌──────────┬─────────────┬────────────┐ │
//! │ │"SSCJ" (4)│ Format (2)  │ Schema (4) │ │
//! │ └──────────┴─────────────┴────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Body   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```

mod reader;
mod record;
mod recovery;
mod writer;

pub use reader::{JournalIterator, JournalReader};
pub use record::{
    JournalHeader, JournalOp, JournalRecord, FILE_HEADER_SIZE, HEADER_SIZE,
    JOURNAL_FORMAT_VERSION, JOURNAL_MAGIC,
};
pub use recovery::{JournalRecovery, RecoveryResult};
pub use writer::JournalWriter;

/// File name of the journal inside a namespace directory
pub const JOURNAL_FILENAME: &str = "journal";

/// Scratch file used while the journal is rewritten
pub const JOURNAL_TEMP_FILENAME: &str = "journal.tmp";
