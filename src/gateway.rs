//! Cross-Process Gateway
//!
//! Structured-call access to one namespace: `insert` returns a structured
//! handle, `query` resolves a handle (or raw key) back to bytes. The store is
//! opened through the registry on first use, not at construction.
//!
//! `execute` maps a wire `Command` onto these calls; the Unix socket
//! transport in `network::gateway` is a thin loop around it.

use std::sync::Arc;

use bytes::Bytes;

use crate::cache::SharedCache;
use crate::config::Config;
use crate::error::Result;
use crate::handle::Handle;
use crate::key::CacheKey;
use crate::protocol::{Command, Response};
use crate::registry::CacheRegistry;

/// Gateway over one namespace
pub struct CrossProcessGateway {
    registry: Arc<CacheRegistry>,
    config: Config,
}

impl CrossProcessGateway {
    /// No I/O happens until the first call
    pub fn new(registry: Arc<CacheRegistry>, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The namespace's cache, opened on first use
    pub fn cache(&self) -> Result<Arc<SharedCache>> {
        self.registry.get_or_create(&self.config)
    }

    /// Store `bytes` and return their structured handle
    pub fn insert(&self, bytes: &[u8]) -> Result<Handle> {
        let cache = self.cache()?;
        let key = cache.insert(bytes)?;
        Ok(cache.structured_handle(&key))
    }

    /// Resolve a handle string or raw hex key
    ///
    /// Malformed references, handles for another namespace and absent keys
    /// all yield `Ok(None)`.
    pub fn query(&self, reference: &str) -> Result<Option<Bytes>> {
        let key = match self.resolve_key(reference) {
            Some(key) => key,
            None => return Ok(None),
        };
        self.cache()?.get(&key)
    }

    fn resolve_key(&self, reference: &str) -> Option<CacheKey> {
        let reference = reference.trim();
        if let Ok(key) = CacheKey::parse(reference) {
            return Some(key);
        }

        match Handle::parse(reference) {
            Ok(handle) if handle.namespace() == self.namespace() => Some(handle.key().clone()),
            Ok(handle) => {
                tracing::debug!(
                    "Query for namespace '{}' sent to '{}'",
                    handle.namespace(),
                    self.namespace()
                );
                None
            }
            Err(e) => {
                tracing::debug!("Unresolvable reference {:?}: {}", reference, e);
                None
            }
        }
    }

    /// Run one wire command
    pub fn execute(&self, command: Command) -> Response {
        match command {
            Command::Query { reference } => match self.query(&reference) {
                Ok(Some(bytes)) => Response::ok(bytes.to_vec()),
                Ok(None) => Response::not_found(),
                Err(e) => Response::error(&e.to_string()),
            },
            Command::Insert { data } => match self.insert(&data) {
                Ok(handle) => Response::ok(handle.to_string()),
                Err(e) => Response::error(&e.to_string()),
            },
            Command::Ping => Response::ok(Vec::new()),
        }
    }
}
