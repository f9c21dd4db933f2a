//! The operation log segment.
//!
//! Records are laid out back to back from offset 0:
//! `[u32 LE payload length][payload]`. The log never wraps; when a record
//! does not fit, the writer publishes a snapshot and starts over at 0.

use sharedobj_shm::Segment;

use crate::error::{Error, Result};

/// Default log segment size in bytes.
pub const DEFAULT_LOG_SIZE: usize = 10_000;

/// Size of the length prefix in front of every record.
pub const RECORD_HEADER_LEN: usize = 4;

/// Name of the log segment belonging to container `name`.
pub fn log_name(name: &str) -> String {
    format!("{}_memory", name)
}

#[derive(Debug)]
pub struct OperationLog {
    segment: Segment,
}

impl OperationLog {
    pub fn create(name: &str, size: usize) -> Result<Self> {
        Ok(Self {
            segment: Segment::create(Some(name), size)?,
        })
    }

    pub fn open(name: &str) -> Result<Self> {
        Ok(Self {
            segment: Segment::open(name)?,
        })
    }

    pub fn capacity(&self) -> usize {
        self.segment.len()
    }

    pub fn close(&mut self) {
        self.segment.close();
    }

    /// Write a record at `start`. Returns the position just past it, or
    /// `None` when it does not fit in the remaining space.
    pub fn append(&self, start: u32, payload: &[u8]) -> Result<Option<u32>> {
        let end = start as usize + RECORD_HEADER_LEN + payload.len();
        if end > self.capacity() || end > u32::MAX as usize {
            return Ok(None);
        }
        let len = payload.len() as u32;
        self.segment.write(start as usize, &len.to_le_bytes())?;
        self.segment
            .write(start as usize + RECORD_HEADER_LEN, payload)?;
        Ok(Some(end as u32))
    }

    /// Read the record at `position`, which must end at or before `end`.
    /// Returns the payload and the position of the next record.
    pub fn read(&self, position: u32, end: u32) -> Result<(Vec<u8>, u32)> {
        let start = position as usize;
        let limit = (end as usize).min(self.capacity());
        if start + RECORD_HEADER_LEN > limit {
            return Err(Error::CorruptLog {
                position,
                reason: format!("record header overruns published end {}", end),
            });
        }
        let mut len = [0u8; RECORD_HEADER_LEN];
        self.segment.read_into(start, &mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        let next = start + RECORD_HEADER_LEN + len;
        if next > limit {
            return Err(Error::CorruptLog {
                position,
                reason: format!("record of {} bytes overruns published end {}", len, end),
            });
        }
        let payload = self.segment.read(start + RECORD_HEADER_LEN, len)?;
        Ok((payload, next as u32))
    }
}
