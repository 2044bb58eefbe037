//! Configuration for scopecache
//!
//! Centralized per-namespace configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CacheError, Result};

/// Default namespace, used both as directory name and HTTP path token
pub const DEFAULT_NAMESPACE: &str = "shared_scope_cache";

/// Default aggregate size budget (10 MiB)
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Configuration for one cache namespace
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory shared by all namespaces.
    /// Internal structure:
    ///   {root_dir}/
    ///     └── {namespace}/
    ///           ├── journal        (entry lifecycle log)
    ///           ├── {key}          (committed blobs)
    ///           └── {key}.tmp      (staged, uncommitted blobs)
    pub root_dir: PathBuf,

    /// Namespace identifier: on-disk subdirectory and HTTP path token
    pub namespace: String,

    /// Schema version; changing it discards the previous generation
    pub schema_version: u32,

    /// Maximum aggregate size of committed blobs (in bytes)
    pub max_size: u64,

    /// Maximum size of a single blob (None = bounded by `max_size`)
    pub max_blob_size: Option<u64>,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the journal
    pub journal_sync_strategy: JournalSyncStrategy,

    /// Redundant record count that triggers a journal rewrite
    pub compaction_threshold: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Gateway connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Gateway connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// Unix socket path for the structured-call gateway
    pub gateway_socket: Option<PathBuf>,
}

/// Journal sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalSyncStrategy {
    /// fsync after every record (safest, slowest)
    EveryWrite,

    /// fsync after N records (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./scopecache_data"),
            namespace: DEFAULT_NAMESPACE.to_string(),
            schema_version: 1,
            max_size: DEFAULT_MAX_SIZE,
            max_blob_size: None,
            journal_sync_strategy: JournalSyncStrategy::EveryNEntries { count: 100 },
            compaction_threshold: 2000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            gateway_socket: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding this namespace's journal and blobs
    pub fn store_dir(&self) -> PathBuf {
        self.root_dir.join(&self.namespace)
    }

    /// Effective per-blob limit
    pub fn blob_limit(&self) -> u64 {
        match self.max_blob_size {
            Some(limit) => limit.min(self.max_size),
            None => self.max_size,
        }
    }

    /// Check the configuration for values the store cannot work with
    pub fn validate(&self) -> Result<()> {
        validate_namespace(&self.namespace)?;

        if self.max_size == 0 {
            return Err(CacheError::Config("max_size must be greater than zero".into()));
        }
        if self.max_blob_size == Some(0) {
            return Err(CacheError::Config(
                "max_blob_size must be greater than zero".into(),
            ));
        }
        if let JournalSyncStrategy::EveryNEntries { count: 0 } = self.journal_sync_strategy {
            return Err(CacheError::Config(
                "journal sync interval must be at least one entry".into(),
            ));
        }
        Ok(())
    }
}

/// Namespaces double as directory names and URL path segments
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::Config("namespace must not be empty".into()));
    }
    if namespace == "." || namespace == ".." {
        return Err(CacheError::Config(format!("namespace '{}' is reserved", namespace)));
    }
    let valid = namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(CacheError::Config(format!(
            "namespace '{}' may only contain ASCII letters, digits, '_', '-' and '.'",
            namespace
        )));
    }
    Ok(())
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the root directory (namespaces live underneath)
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the namespace identifier
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the schema version
    pub fn schema_version(mut self, version: u32) -> Self {
        self.config.schema_version = version;
        self
    }

    /// Set the aggregate size budget (in bytes)
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.config.max_size = bytes;
        self
    }

    /// Set the per-blob size limit (in bytes)
    pub fn max_blob_size(mut self, bytes: u64) -> Self {
        self.config.max_blob_size = Some(bytes);
        self
    }

    /// Set the journal sync strategy
    pub fn journal_sync_strategy(mut self, strategy: JournalSyncStrategy) -> Self {
        self.config.journal_sync_strategy = strategy;
        self
    }

    /// Set the journal compaction threshold
    pub fn compaction_threshold(mut self, records: usize) -> Self {
        self.config.compaction_threshold = records;
        self
    }

    /// Set the gateway read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the gateway write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the gateway Unix socket path
    pub fn gateway_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.gateway_socket = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
