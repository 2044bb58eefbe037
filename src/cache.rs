//! Shared Cache
//!
//! One namespace's store together with its lazily bound loopback endpoint.
//! Producers go through this type: derive the key, write the blob, and hand
//! out a handle in whichever transport the consumer speaks.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::handle::Handle;
use crate::key::{CacheKey, KeyDeriver};
use crate::network::LoopbackServer;
use crate::store::{BlobStore, StoreOptions};

/// Attempts made when another thread is editing the same key
const MAX_EDIT_ATTEMPTS: u32 = 8;

/// First retry delay; doubles on each attempt
const EDIT_RETRY_DELAY: Duration = Duration::from_millis(2);

/// A namespace's store plus its loopback endpoint
pub struct SharedCache {
    config: Config,
    store: Arc<BlobStore>,
    deriver: KeyDeriver,
    loopback: Mutex<Option<Arc<LoopbackServer>>>,
}

impl SharedCache {
    /// Open the store described by `config`
    ///
    /// The loopback endpoint is not bound until a network handle is needed.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let deriver = KeyDeriver::new()?;
        let store = BlobStore::open_with(StoreOptions::from_config(&config))?;

        Ok(Self {
            config,
            store: Arc::new(store),
            deriver,
            loopback: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    /// Content address of `bytes`
    pub fn derive_key(&self, bytes: &[u8]) -> CacheKey {
        self.deriver.derive(bytes)
    }

    /// Store `bytes` and return their key
    ///
    /// Identical content is stored once. If another thread is writing the
    /// same content, waits for it with bounded backoff.
    pub fn insert(&self, bytes: &[u8]) -> Result<CacheKey> {
        let key = self.deriver.derive(bytes);
        let mut delay = EDIT_RETRY_DELAY;

        for attempt in 1..=MAX_EDIT_ATTEMPTS {
            match self.store.insert(&key, bytes) {
                Ok(outcome) => {
                    tracing::debug!("Insert {} into '{}': {:?}", key, self.namespace(), outcome);
                    return Ok(key);
                }
                Err(CacheError::ConcurrentEdit { .. }) if attempt < MAX_EDIT_ATTEMPTS => {
                    thread::sleep(delay);
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CacheError::ConcurrentEdit {
            key: key.to_string(),
        })
    }

    /// Store `bytes` and return a network handle
    ///
    /// Binds the loopback endpoint first; if that fails nothing is written.
    pub fn append(&self, bytes: &[u8]) -> Result<Handle> {
        let loopback = self.loopback()?;
        let key = self.insert(bytes)?;
        Ok(loopback.handle_for(&key))
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        self.store.get(key)
    }

    pub fn structured_handle(&self, key: &CacheKey) -> Handle {
        Handle::structured(self.namespace(), key.clone())
    }

    pub fn network_handle(&self, key: &CacheKey) -> Result<Handle> {
        Ok(self.loopback()?.handle_for(key))
    }

    /// The loopback endpoint, binding it on first use
    ///
    /// A failed bind is not remembered; the next call tries again.
    pub fn loopback(&self) -> Result<Arc<LoopbackServer>> {
        let mut slot = self.loopback.lock();
        if let Some(server) = slot.as_ref() {
            return Ok(Arc::clone(server));
        }

        let server =
            LoopbackServer::start(Arc::clone(&self.store), self.namespace()).map_err(|e| {
                tracing::warn!("Loopback endpoint for '{}' unavailable: {}", self.namespace(), e);
                e
            })?;

        let server = Arc::new(server);
        *slot = Some(Arc::clone(&server));
        Ok(server)
    }

    /// Whether the loopback endpoint has been bound
    pub fn has_loopback(&self) -> bool {
        self.loopback.lock().is_some()
    }

    /// Stop the loopback endpoint and close the store
    pub fn shutdown(&self) -> Result<()> {
        if let Some(server) = self.loopback.lock().take() {
            server.shutdown();
        }
        self.store.close()
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("namespace", &self.config.namespace)
            .field("dir", &self.store.directory())
            .finish()
    }
}
