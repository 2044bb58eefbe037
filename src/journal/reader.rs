//! Journal Reader
//!
//! Reads the header and records from a journal file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{CacheError, Result};

use super::record::{FILE_HEADER_SIZE, HEADER_SIZE};
use super::{JournalHeader, JournalRecord};

/// Reads records from the journal file
pub struct JournalReader {
    reader: BufReader<File>,
    header: JournalHeader,
    /// Offset just past the last well-formed record
    position: u64,
}

impl JournalReader {
    /// Open a journal and validate its header
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; FILE_HEADER_SIZE as usize];
        let read = read_fully(&mut reader, &mut header_bytes)?;
        let header = JournalHeader::decode(&header_bytes[..read])?;

        Ok(Self {
            reader,
            header,
            position: FILE_HEADER_SIZE,
        })
    }

    pub fn header(&self) -> JournalHeader {
        self.header
    }

    /// Offset just past the last record returned successfully
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record
    ///
    /// `Ok(None)` at a clean end of file; `JournalCorruption` for a partial
    /// or damaged record.
    pub fn next_record(&mut self) -> Result<Option<JournalRecord>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_fully(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(CacheError::JournalCorruption(format!(
                "partial record header at offset {}",
                self.position
            )));
        }

        let (lsn, crc, len) = JournalRecord::parse_header(&header)?;
        let mut body = vec![0u8; len as usize];
        let read = read_fully(&mut self.reader, &mut body)?;
        if read < body.len() {
            return Err(CacheError::JournalCorruption(format!(
                "partial record body at offset {}: {} of {} bytes",
                self.position, read, len
            )));
        }

        let record = JournalRecord::decode_body(lsn, crc, &body)?;
        self.position += (HEADER_SIZE + body.len()) as u64;
        Ok(Some(record))
    }

    /// Iterate over records until end of file or the first damaged record
    pub fn records(self) -> JournalIterator {
        JournalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over journal records
pub struct JournalIterator {
    reader: JournalReader,
    done: bool,
}

impl Iterator for JournalIterator {
    type Item = Result<JournalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill as much of `buf` as the file allows, returning the byte count
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
