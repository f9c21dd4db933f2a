//! Control block layout.
//!
//! Every container has a small control segment, named after the container,
//! that attached processes poll to learn about new log records and snapshots.
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────────────────┐
//! │ 0..4     │ stream position (u32 LE): end of the published log       │
//! │ 4..8     │ snapshot counter (u32 LE): number of snapshots published │
//! │ 8..10    │ nested flag ("1" when nested promotion is on)            │
//! │ 10..265  │ current snapshot name, space / NUL padded                │
//! │ 265..269 │ descriptor length (u32 LE)                               │
//! │ 269..    │ encoded kind descriptor                                  │
//! └──────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! The two counters are written with release stores and read with acquire
//! loads; the writer publishes the stream position only after the record it
//! covers is fully in the log.

use std::sync::atomic::Ordering;

use sharedobj_shm::Segment;
use static_assertions::{const_assert, const_assert_eq};

use crate::error::{Error, Result};

/// Default control segment size in bytes.
pub const DEFAULT_CONTROL_SIZE: usize = 1000;

pub const STREAM_POSITION_OFFSET: usize = 0;
pub const SNAPSHOT_COUNTER_OFFSET: usize = 4;
pub const NESTED_OFFSET: usize = 8;
pub const NESTED_LEN: usize = 2;
pub const SNAPSHOT_NAME_OFFSET: usize = 10;
pub const SNAPSHOT_NAME_LEN: usize = 255;
pub const DESCRIPTOR_LEN_OFFSET: usize = 265;
pub const DESCRIPTOR_OFFSET: usize = 269;

const_assert_eq!(SNAPSHOT_COUNTER_OFFSET, STREAM_POSITION_OFFSET + 4);
const_assert_eq!(NESTED_OFFSET, SNAPSHOT_COUNTER_OFFSET + 4);
const_assert_eq!(SNAPSHOT_NAME_OFFSET, NESTED_OFFSET + NESTED_LEN);
const_assert_eq!(DESCRIPTOR_LEN_OFFSET, SNAPSHOT_NAME_OFFSET + SNAPSHOT_NAME_LEN);
const_assert_eq!(DESCRIPTOR_OFFSET, DESCRIPTOR_LEN_OFFSET + 4);
// Both counters are accessed as atomic words.
const_assert!(STREAM_POSITION_OFFSET % 4 == 0);
const_assert!(SNAPSHOT_COUNTER_OFFSET % 4 == 0);
const_assert!(DEFAULT_CONTROL_SIZE > DESCRIPTOR_OFFSET);

/// Typed view over a container's control segment.
#[derive(Debug)]
pub struct ControlBlock {
    segment: Segment,
}

impl ControlBlock {
    /// Create a zeroed control block; `size` must at least hold the fixed fields.
    pub fn create(name: Option<&str>, size: usize) -> Result<Self> {
        if size < DESCRIPTOR_OFFSET {
            return Err(Error::DescriptorTooLarge {
                required: DESCRIPTOR_OFFSET,
                available: size,
            });
        }
        Ok(Self {
            segment: Segment::create(name, size)?,
        })
    }

    pub fn open(name: &str) -> Result<Self> {
        let segment = Segment::open(name)?;
        if segment.len() < DESCRIPTOR_OFFSET {
            return Err(Error::CorruptLog {
                position: 0,
                reason: format!("control block {:?} is only {} bytes", name, segment.len()),
            });
        }
        Ok(Self { segment })
    }

    pub fn name(&self) -> &str {
        self.segment.name()
    }

    pub fn len(&self) -> usize {
        self.segment.len()
    }

    pub fn close(&mut self) {
        self.segment.close();
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    pub fn stream_position(&self) -> Result<u32> {
        self.load(STREAM_POSITION_OFFSET)
    }

    pub fn set_stream_position(&self, position: u32) -> Result<()> {
        self.store(STREAM_POSITION_OFFSET, position)
    }

    pub fn snapshot_counter(&self) -> Result<u32> {
        self.load(SNAPSHOT_COUNTER_OFFSET)
    }

    /// Increment the snapshot counter, returning the new value.
    ///
    /// Read-modify-write, not an atomic increment: there is a single writer.
    pub fn bump_snapshot_counter(&self) -> Result<u32> {
        let next = self.snapshot_counter()?.wrapping_add(1);
        self.store(SNAPSHOT_COUNTER_OFFSET, next)?;
        Ok(next)
    }

    fn load(&self, offset: usize) -> Result<u32> {
        let word = self.segment.atomic_u32(offset)?;
        Ok(u32::from_le(word.load(Ordering::Acquire)))
    }

    fn store(&self, offset: usize, value: u32) -> Result<()> {
        let word = self.segment.atomic_u32(offset)?;
        word.store(value.to_le(), Ordering::Release);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Flags and names
    // -------------------------------------------------------------------------

    pub fn nested(&self) -> Result<bool> {
        Ok(self.segment.read(NESTED_OFFSET, 1)?[0] == b'1')
    }

    pub fn set_nested(&self, nested: bool) -> Result<()> {
        let flag = if nested { b"1 " } else { b"0 " };
        self.segment.write(NESTED_OFFSET, flag)?;
        Ok(())
    }

    /// Name of the current snapshot segment, if one was ever published.
    pub fn snapshot_name(&self) -> Result<Option<String>> {
        let raw = self.segment.read(SNAPSHOT_NAME_OFFSET, SNAPSHOT_NAME_LEN)?;
        let text = String::from_utf8_lossy(&raw);
        let name = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(name.to_string()))
        }
    }

    pub fn set_snapshot_name(&self, name: &str) -> Result<()> {
        if name.len() > SNAPSHOT_NAME_LEN {
            return Err(Error::UnsupportedKind(format!(
                "snapshot name {:?} is longer than {} bytes",
                name, SNAPSHOT_NAME_LEN
            )));
        }
        let mut field = [b' '; SNAPSHOT_NAME_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        self.segment.write(SNAPSHOT_NAME_OFFSET, &field)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Descriptor
    // -------------------------------------------------------------------------

    pub fn write_descriptor(&self, bytes: &[u8]) -> Result<()> {
        let required = DESCRIPTOR_OFFSET + bytes.len();
        if required > self.segment.len() {
            return Err(Error::DescriptorTooLarge {
                required,
                available: self.segment.len(),
            });
        }
        self.segment
            .write(DESCRIPTOR_LEN_OFFSET, &(bytes.len() as u32).to_le_bytes())?;
        self.segment.write(DESCRIPTOR_OFFSET, bytes)?;
        Ok(())
    }

    pub fn read_descriptor(&self) -> Result<Vec<u8>> {
        let mut len = [0u8; 4];
        self.segment.read_into(DESCRIPTOR_LEN_OFFSET, &mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        if DESCRIPTOR_OFFSET + len > self.segment.len() {
            return Err(Error::CorruptLog {
                position: 0,
                reason: format!(
                    "descriptor of {} bytes overruns control block {:?}",
                    len,
                    self.segment.name()
                ),
            });
        }
        Ok(self.segment.read(DESCRIPTOR_OFFSET, len)?)
    }
}
