//! Consumer-side handle resolution
//!
//! Given any handle, fetch the bytes through the transport it names:
//! network handles over HTTP to the producer's loopback endpoint, structured
//! handles over the gateway socket. Network handles that point anywhere but
//! a loopback host are refused.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::handle::Handle;
use crate::network;

/// Default timeout for connects, reads and writes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dispatches handles to the right transport
#[derive(Debug, Clone)]
pub struct Resolver {
    gateway_socket: Option<PathBuf>,
    timeout: Duration,
    max_response_size: u64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            gateway_socket: None,
            timeout: DEFAULT_TIMEOUT,
            max_response_size: network::DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Socket used for structured handles
    pub fn with_gateway_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.gateway_socket = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Largest HTTP body accepted from a loopback endpoint
    pub fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.max_response_size = bytes;
        self
    }

    /// Fetch the blob behind `handle`; `Ok(None)` if it is not cached
    pub fn fetch(&self, handle: &Handle) -> Result<Option<Vec<u8>>> {
        match handle {
            Handle::Network { authority, .. } => {
                if !handle.is_local() {
                    return Err(CacheError::InvalidHandle(format!(
                        "{} is not a loopback authority",
                        authority
                    )));
                }
                network::fetch(&handle.to_string(), self.timeout, self.max_response_size)
            }
            Handle::Structured { .. } => self.fetch_structured(handle),
        }
    }

    #[cfg(unix)]
    fn fetch_structured(&self, handle: &Handle) -> Result<Option<Vec<u8>>> {
        let socket = self.gateway_socket.as_ref().ok_or_else(|| {
            CacheError::Config("structured handle needs a gateway socket".into())
        })?;
        let mut client = network::GatewayClient::connect(socket)?;
        client.set_timeout(Some(self.timeout))?;
        client.query(&handle.to_string())
    }

    #[cfg(not(unix))]
    fn fetch_structured(&self, _handle: &Handle) -> Result<Option<Vec<u8>>> {
        Err(CacheError::Config(
            "structured handles need Unix domain sockets".into(),
        ))
    }
}
