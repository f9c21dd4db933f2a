//! Snapshot segments.
//!
//! A snapshot is a fresh, randomly named segment holding
//! `[u32 LE length][encoded container]`. The control block points at the
//! current one; the previous snapshot is unlinked once a new one is published.

use sharedobj_shm::Segment;

use crate::error::{Error, Result};

/// Publish `bytes` into a new snapshot segment and return its name.
pub fn write(bytes: &[u8]) -> Result<String> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::StorageExhausted {
        name: String::new(),
        size: bytes.len(),
    })?;
    let mut segment = Segment::create(None, bytes.len() + 4)?;
    segment.write(0, &len.to_le_bytes())?;
    segment.write(4, bytes)?;
    let name = segment.name().to_string();
    segment.close();
    tracing::debug!(snapshot = %name, len, "wrote snapshot");
    Ok(name)
}

/// Read the snapshot payload stored under `name`.
pub fn read(name: &str) -> Result<Vec<u8>> {
    let mut segment = Segment::open(name)?;
    let mut len = [0u8; 4];
    segment.read_into(0, &mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len + 4 > segment.len() {
        return Err(Error::CorruptLog {
            position: 0,
            reason: format!("snapshot {:?} claims {} bytes in a {} byte segment", name, len, segment.len()),
        });
    }
    let bytes = segment.read(4, len)?;
    segment.close();
    Ok(bytes)
}

/// Remove a snapshot segment; missing snapshots are ignored.
pub fn unlink(name: &str) -> bool {
    match Segment::unlink(name) {
        Ok(()) => true,
        Err(e) => {
            tracing::trace!(snapshot = %name, error = %e, "snapshot already gone");
            false
        }
    }
}
