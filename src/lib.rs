//! # scopecache
//!
//! A size-bounded, content-addressed blob cache shared between processes on
//! one device:
//! - Blobs keyed by the SHA-256 of their content (identical bytes stored once)
//! - Journaled LRU store with crash recovery
//! - Opaque handles resolvable over a loopback HTTP endpoint or a
//!   structured-call gateway socket
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │  Loopback HTTP endpoint  │      │  Gateway (Unix socket)   │
//! │  GET /<ns>?key=<hex>     │      │  QUERY / INSERT / PING   │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//!              │          ┌──────────────┐       │
//!              └─────────►│ SharedCache  │◄──────┘
//!                         │ (per ns, via │
//!                         │  Registry)   │
//!                         └──────┬───────┘
//!                                │
//!                  ┌─────────────▼─────────────┐
//!                  │        BlobStore          │
//!                  │  (Mutex: LRU index, size, │
//!                  │   journal, live editors)  │
//!                  └─────┬───────────────┬─────┘
//!                        │               │
//!                        ▼               ▼
//!                 ┌────────────┐  ┌────────────┐
//!                 │  Journal   │  │ Blob files │
//!                 │ (append)   │  │ {key}      │
//!                 └────────────┘  └────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod cache;
pub mod client;
pub mod gateway;
pub mod handle;
pub mod journal;
pub mod key;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::SharedCache;
pub use client::Resolver;
pub use config::{Config, JournalSyncStrategy};
pub use error::{CacheError, Result};
pub use gateway::CrossProcessGateway;
pub use handle::{Handle, Transport};
pub use key::{derive_key, CacheKey, KeyDeriver};
pub use registry::CacheRegistry;
pub use store::{BlobStore, CommitOutcome, Editor, StoreOptions};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of scopecache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
