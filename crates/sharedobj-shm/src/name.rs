//! Segment name handling.

use uuid::Uuid;

use crate::{Result, SegmentError};

/// Longest accepted name, not counting the leading `/` added for the OS.
pub const MAX_NAME_LEN: usize = 254;

/// Prefix of generated names.
const GENERATED_PREFIX: &str = "psm_";

/// Check that `name` can be turned into a portable POSIX shm name.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.contains('/') {
        Some("name must not contain '/'")
    } else if name.contains('\0') {
        Some("name must not contain NUL bytes")
    } else if name.len() > MAX_NAME_LEN {
        Some("name must be at most 254 bytes")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SegmentError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// The name handed to `shm_open` / `shm_unlink`.
pub fn os_name(name: &str) -> String {
    format!("/{}", name)
}

/// Generate a fresh random name: `psm_` followed by a v4 UUID in hex.
pub fn generate_name() -> String {
    format!("{}{}", GENERATED_PREFIX, Uuid::new_v4().simple())
}
