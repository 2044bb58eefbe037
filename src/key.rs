//! Key Derivation
//!
//! Content keys are the lowercase hex SHA-256 digest of the blob. Identical
//! payloads always map to the same key, which is how duplicates collapse.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Length of a key in hex characters (256-bit digest)
pub const KEY_LEN: usize = 64;

/// Known-answer vector used to check the hash primitive at startup
const SELF_TEST_INPUT: &[u8] = b"abc";
const SELF_TEST_DIGEST: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

/// A 64-character lowercase hex content key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse and validate a key string
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != KEY_LEN {
            return Err(CacheError::InvalidKey(format!(
                "expected {} hex characters, got {}",
                KEY_LEN,
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(CacheError::InvalidKey(format!(
                "'{}' is not lowercase hex",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives content keys from payloads
///
/// Stateless: every call hashes with its own `Sha256` context, so any number
/// of threads can derive keys in parallel through a shared reference.
#[derive(Debug, Clone, Copy)]
pub struct KeyDeriver {
    _checked: (),
}

impl KeyDeriver {
    /// Create a deriver after verifying the hash primitive
    pub fn new() -> Result<Self> {
        let digest = hex::encode(Sha256::digest(SELF_TEST_INPUT));
        if digest != SELF_TEST_DIGEST {
            return Err(CacheError::HashUnavailable(format!(
                "SHA-256 self-test failed: got {}",
                digest
            )));
        }
        Ok(Self { _checked: () })
    }

    /// Compute the content key for a payload
    pub fn derive(&self, bytes: &[u8]) -> CacheKey {
        derive_key(bytes)
    }
}

/// Compute the content key for a payload without a deriver
pub fn derive_key(bytes: &[u8]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    CacheKey(hex::encode(hasher.finalize()))
}
