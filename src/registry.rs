//! Cache Registry
//!
//! Exactly one `SharedCache` per namespace per process. The registry is an
//! ordinary value: create one at startup and pass it (as `Arc`) to whatever
//! needs a cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::SharedCache;
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Namespace -> open cache
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<String, Arc<SharedCache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache for `config.namespace`, opening it on first use
    ///
    /// Opening happens under the registry lock, so concurrent first callers
    /// share a single store. A later call with a different config for the
    /// same namespace gets the existing cache.
    pub fn get_or_create(&self, config: &Config) -> Result<Arc<SharedCache>> {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(&config.namespace) {
            return Ok(Arc::clone(cache));
        }

        let dir = normalize(config.store_dir());
        if let Some(owner) = caches
            .values()
            .find(|cache| normalize(cache.store().directory().to_path_buf()) == dir)
        {
            return Err(CacheError::Config(format!(
                "directory {} already belongs to namespace '{}'",
                dir.display(),
                owner.namespace()
            )));
        }

        let cache = Arc::new(SharedCache::open(config.clone())?);
        caches.insert(config.namespace.clone(), Arc::clone(&cache));
        tracing::info!("Registered namespace '{}' at {}", config.namespace, dir.display());
        Ok(cache)
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<SharedCache>> {
        self.caches.lock().get(namespace).cloned()
    }

    /// Registered namespaces, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Shut down and forget every cache
    ///
    /// Every cache is shut down even if one fails; the first error is returned.
    pub fn shutdown(&self) -> Result<()> {
        let caches: Vec<_> = self.caches.lock().drain().collect();
        let mut first_error = None;
        for (namespace, cache) in caches {
            if let Err(e) = cache.shutdown() {
                tracing::warn!("Shutdown of '{}' failed: {}", namespace, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn normalize(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}
