//! Fortran sequential-record framing
//!
//! Unformatted sequential files wrap every record in a 4-byte length prefix
//! and a matching 4-byte suffix. [`RecordReader`] walks those records during a
//! header scan, either returning the payload or skipping it and remembering
//! where it starts so data records can be read later on demand.

use crate::errors::{MeteoError, Result};
use crate::layout::Endian;
use std::io::{self, Read, Seek, SeekFrom};

/// Bytes of framing around each record payload.
pub const MARKER_BYTES: u64 = 4;

/// Location of one record payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
    endian: Endian,
    pos: u64,
}

impl<R: Read + Seek> RecordReader<R> {
    pub fn new(inner: R, endian: Endian) -> Self {
        Self {
            inner,
            endian,
            pos: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read one length marker; `None` on a clean end of file.
    fn read_marker(&mut self) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            4 => {
                self.pos += MARKER_BYTES;
                Ok(Some(match self.endian {
                    Endian::Little => u32::from_le_bytes(buf),
                    Endian::Big => u32::from_be_bytes(buf),
                }))
            }
            n => Err(MeteoError::truncated(format!(
                "record marker at byte {} has only {n} bytes",
                self.pos
            ))),
        }
    }

    fn expect_suffix(&mut self, record: Record) -> Result<()> {
        match self.read_marker()? {
            Some(suffix) if u64::from(suffix) == record.len => Ok(()),
            Some(suffix) => Err(MeteoError::format(format!(
                "record at byte {} has prefix {} but suffix {suffix}",
                record.offset - MARKER_BYTES,
                record.len
            ))),
            None => Err(MeteoError::truncated(format!(
                "record at byte {} is missing its suffix",
                record.offset - MARKER_BYTES
            ))),
        }
    }

    /// Read the next record payload.
    pub fn read_record(&mut self) -> Result<Option<(Record, Vec<u8>)>> {
        let Some(len) = self.read_marker()? else {
            return Ok(None);
        };
        let record = Record {
            offset: self.pos,
            len: u64::from(len),
        };
        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => MeteoError::truncated(format!(
                "record payload at byte {} is shorter than {len} bytes",
                record.offset
            )),
            _ => MeteoError::Io(e),
        })?;
        self.pos += record.len;
        self.expect_suffix(record)?;
        Ok(Some((record, payload)))
    }

    /// Like [`read_record`](Self::read_record) but an end of file is an error.
    pub fn require_record(&mut self, what: &str) -> Result<(Record, Vec<u8>)> {
        self.read_record()?.ok_or_else(|| {
            MeteoError::truncated(format!("expected {what} at byte {}", self.pos))
        })
    }

    /// Skip the next record payload, returning where it lives.
    pub fn skip_record(&mut self) -> Result<Option<Record>> {
        let Some(len) = self.read_marker()? else {
            return Ok(None);
        };
        let record = Record {
            offset: self.pos,
            len: u64::from(len),
        };
        self.inner.seek(SeekFrom::Current(i64::from(len)))?;
        self.pos += record.len;
        self.expect_suffix(record)?;
        Ok(Some(record))
    }
}

/// Length prefix of the record starting at `at` in `head`, if present.
pub fn marker_at(head: &[u8], at: usize, endian: Endian) -> Option<u32> {
    let bytes: [u8; 4] = head.get(at..at + 4)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u32::from_le_bytes(bytes),
        Endian::Big => u32::from_be_bytes(bytes),
    })
}
