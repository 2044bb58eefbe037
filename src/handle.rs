//! Handles
//!
//! A handle is the opaque string a producer hands to consumers. It names the
//! transport, the namespace and the key, plus the loopback authority for the
//! network transport:
//!
//! ```text
//! http://127.0.0.1:<port>/<namespace>?key=<hex>     (network)
//! scopecache://<namespace>?key=<hex>                (structured call)
//! ```
//!
//! Handles are bearer tokens; anyone holding one can read the blob. Network
//! handles only ever point at a loopback host, so resolving one never leaves
//! the device.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use url::{Host, Url};

use crate::config::validate_namespace;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

/// URL scheme of structured-call handles
pub const STRUCTURED_SCHEME: &str = "scopecache";

/// Query parameter carrying the key
pub const KEY_PARAMETER: &str = "key";

/// Transport a handle resolves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Network,
    Structured,
}

/// Address of a cached blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
    /// Served by a loopback HTTP endpoint at `authority` (`host:port`)
    Network {
        authority: String,
        namespace: String,
        key: CacheKey,
    },

    /// Served by the structured-call gateway of `namespace`
    Structured { namespace: String, key: CacheKey },
}

impl Handle {
    pub fn network(addr: SocketAddr, namespace: impl Into<String>, key: CacheKey) -> Self {
        Handle::Network {
            authority: addr.to_string(),
            namespace: namespace.into(),
            key,
        }
    }

    pub fn structured(namespace: impl Into<String>, key: CacheKey) -> Self {
        Handle::Structured {
            namespace: namespace.into(),
            key,
        }
    }

    pub fn key(&self) -> &CacheKey {
        match self {
            Handle::Network { key, .. } | Handle::Structured { key, .. } => key,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Handle::Network { namespace, .. } | Handle::Structured { namespace, .. } => namespace,
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            Handle::Network { .. } => Transport::Network,
            Handle::Structured { .. } => Transport::Structured,
        }
    }

    /// Whether resolving the handle stays on this device
    ///
    /// Always true for structured handles. A network handle is local when its
    /// authority is a loopback address or `localhost`.
    pub fn is_local(&self) -> bool {
        match self {
            Handle::Network { authority, .. } => Url::parse(&format!("http://{}/", authority))
                .ok()
                .filter(|url| url.path() == "/" && url.username().is_empty())
                .and_then(|url| url.host().map(|host| is_loopback_host(&host)))
                .unwrap_or(false),
            Handle::Structured { .. } => true,
        }
    }

    /// Parse a handle string
    pub fn parse(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| CacheError::InvalidHandle(format!("{}: {}", s, e)))?;

        let key = url
            .query_pairs()
            .find(|(name, _)| name == KEY_PARAMETER)
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| CacheError::InvalidHandle(format!("{}: missing key parameter", s)))?;
        let key = CacheKey::parse(&key).map_err(|e| CacheError::InvalidHandle(e.to_string()))?;

        match url.scheme() {
            "http" => {
                let host = url
                    .host()
                    .ok_or_else(|| CacheError::InvalidHandle(format!("{}: missing host", s)))?;
                if !is_loopback_host(&host) {
                    return Err(CacheError::InvalidHandle(format!(
                        "{}: host {} is not a loopback address",
                        s, host
                    )));
                }
                let port = url
                    .port_or_known_default()
                    .ok_or_else(|| CacheError::InvalidHandle(format!("{}: missing port", s)))?;
                let namespace = url.path().trim_start_matches('/');
                validate_namespace(namespace)
                    .map_err(|e| CacheError::InvalidHandle(e.to_string()))?;

                Ok(Handle::Network {
                    authority: format!("{}:{}", host, port),
                    namespace: namespace.to_string(),
                    key,
                })
            }
            STRUCTURED_SCHEME => {
                let namespace = url.host_str().unwrap_or_default();
                validate_namespace(namespace)
                    .map_err(|e| CacheError::InvalidHandle(e.to_string()))?;

                Ok(Handle::Structured {
                    namespace: namespace.to_string(),
                    key,
                })
            }
            other => Err(CacheError::InvalidHandle(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }
}

fn is_loopback_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Network {
                authority,
                namespace,
                key,
            } => write!(f, "http://{}/{}?{}={}", authority, namespace, KEY_PARAMETER, key),
            Handle::Structured { namespace, key } => write!(
                f,
                "{}://{}?{}={}",
                STRUCTURED_SCHEME, namespace, KEY_PARAMETER, key
            ),
        }
    }
}

impl FromStr for Handle {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
