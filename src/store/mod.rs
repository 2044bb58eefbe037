//! Store Module
//!
//! The content-addressed blob store.
//!
//! ## Responsibilities
//! - Persist immutable blobs, one file per key
//! - Atomic editor/commit protocol (stage, fsync, rename)
//! - LRU eviction under an aggregate size budget
//! - Crash recovery through journal replay
//!
//! ## Directory Layout
//! ```text
//! {dir}/
//!   ├── journal          lifecycle log (see `journal` module)
//!   ├── {key}            committed blob, never modified after publish
//!   └── {key}.tmp        staged bytes of a live editor
//! ```

mod blob_store;
mod editor;
mod entry;
mod index;

pub use blob_store::{BlobStore, StoreOptions, LOCK_FILENAME};
pub use editor::Editor;
pub use entry::{CacheEntry, CacheStats, CommitOutcome, EntryState};
pub use index::LruIndex;
