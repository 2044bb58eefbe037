//! Journal record definitions
//!
//! Defines the file header and the framing of individual journal records.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::key::CacheKey;

/// Magic bytes identifying a scopecache journal
pub const JOURNAL_MAGIC: &[u8; 4] = b"SSCJ";

/// Current journal format version
pub const JOURNAL_FORMAT_VERSION: u16 = 1;

/// File header size: Magic (4) + FormatVersion (2) + SchemaVersion (4)
pub const FILE_HEADER_SIZE: u64 = 10;

/// Record header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a record body; anything larger is treated as corruption
pub const MAX_RECORD_SIZE: u32 = 64 * 1024;

/// Lifecycle operations recorded in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalOp {
    /// An editor was opened for the key
    Dirty { key: CacheKey },

    /// The key was committed with `size` bytes
    Clean { key: CacheKey, size: u64 },

    /// The key was removed (evicted, deleted, or edit abandoned)
    Remove { key: CacheKey },

    /// The key was read (recency only)
    Read { key: CacheKey },
}

impl JournalOp {
    pub fn key(&self) -> &CacheKey {
        match self {
            JournalOp::Dirty { key }
            | JournalOp::Clean { key, .. }
            | JournalOp::Remove { key }
            | JournalOp::Read { key } => key,
        }
    }
}

/// A single record in the journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The lifecycle operation
    pub op: JournalOp,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,
}

#[derive(Serialize)]
struct BodyRef<'a> {
    op: &'a JournalOp,
    timestamp: u64,
}

#[derive(Deserialize)]
struct Body {
    op: JournalOp,
    timestamp: u64,
}

impl JournalRecord {
    pub fn new(lsn: u64, op: JournalOp) -> Self {
        Self {
            lsn,
            op,
            timestamp: now_millis(),
        }
    }

    /// Encode as `[lsn (8)][crc (4)][len (4)][body]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(&BodyRef {
            op: &self.op,
            timestamp: self.timestamp,
        })?;
        let crc = Self::compute_crc(&body);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode one record from the front of `bytes`
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(CacheError::JournalCorruption(format!(
                "incomplete record header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let (lsn, crc, len) = Self::parse_header(&bytes[..HEADER_SIZE])?;
        let total = HEADER_SIZE + len as usize;
        if bytes.len() < total {
            return Err(CacheError::JournalCorruption(format!(
                "incomplete record body: {} of {} bytes",
                bytes.len() - HEADER_SIZE,
                len
            )));
        }

        let record = Self::decode_body(lsn, crc, &bytes[HEADER_SIZE..total])?;
        Ok((record, total))
    }

    /// Split a record header into (lsn, crc, body length)
    pub(crate) fn parse_header(header: &[u8]) -> Result<(u64, u32, u32)> {
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&header[0..8]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&header[8..12]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[12..16]);

        let len = u32::from_le_bytes(len);
        if len > MAX_RECORD_SIZE {
            return Err(CacheError::JournalCorruption(format!(
                "record length {} exceeds maximum {}",
                len, MAX_RECORD_SIZE
            )));
        }
        Ok((u64::from_le_bytes(lsn), u32::from_le_bytes(crc), len))
    }

    /// Verify the checksum and decode a record body
    pub(crate) fn decode_body(lsn: u64, crc: u32, body: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(body);
        if actual != crc {
            return Err(CacheError::JournalCorruption(format!(
                "CRC mismatch at lsn {}: expected {:08x}, found {:08x}",
                lsn, crc, actual
            )));
        }

        let body: Body = bincode::deserialize(body).map_err(|e| {
            CacheError::JournalCorruption(format!("undecodable record at lsn {}: {}", lsn, e))
        })?;

        Ok(Self {
            lsn,
            op: body.op,
            timestamp: body.timestamp,
        })
    }

    pub fn compute_crc(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// Journal file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    pub format_version: u16,
    pub schema_version: u32,
}

impl JournalHeader {
    pub fn new(schema_version: u32) -> Self {
        Self {
            format_version: JOURNAL_FORMAT_VERSION,
            schema_version,
        }
    }

    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut bytes = [0u8; FILE_HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(JOURNAL_MAGIC);
        bytes[4..6].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.schema_version.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE as usize {
            return Err(CacheError::JournalCorruption(format!(
                "journal header truncated to {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != JOURNAL_MAGIC {
            return Err(CacheError::JournalCorruption("bad journal magic".into()));
        }

        let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if format_version != JOURNAL_FORMAT_VERSION {
            return Err(CacheError::JournalCorruption(format!(
                "unsupported journal format version {}",
                format_version
            )));
        }

        let schema_version = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        Ok(Self {
            format_version,
            schema_version,
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
