//! Shared memory segment mapping.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::atomic::AtomicU32;

use crate::name::{generate_name, os_name, validate_name};
use crate::{Result, SegmentError};

/// How many random names to try before giving up on an anonymous create.
const GENERATE_ATTEMPTS: usize = 64;

/// A live mapping of a shared memory object.
struct Mapping {
    /// Base address of the mapping.
    base_addr: *mut u8,
    /// Size of the mapping in bytes.
    size: usize,
    /// The shm file descriptor (kept open while mapped).
    _file: File,
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: base_addr and size were returned by a successful mmap.
        unsafe {
            libc::munmap(self.base_addr as *mut libc::c_void, self.size);
        }
    }
}

/// A named, fixed-size shared memory region mapped into this process.
///
/// Dropping a segment (or calling [`Segment::close`]) unmaps it but leaves
/// the named object in place; only [`Segment::unlink`] removes the name.
pub struct Segment {
    name: String,
    size: usize,
    mapping: Option<Mapping>,
}

// SAFETY: the mapping is plain shared bytes; cross-process ordering is the
// caller's concern and is done with the atomics returned by `atomic_u32`.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create a new segment of `size` bytes.
    ///
    /// With `name == None` a random name is generated, retrying on collision.
    pub fn create(name: Option<&str>, size: usize) -> Result<Self> {
        match name {
            Some(name) => Self::create_named(name, size),
            None => {
                for _ in 0..GENERATE_ATTEMPTS {
                    match Self::create_named(&generate_name(), size) {
                        Err(SegmentError::AlreadyExists(_)) => continue,
                        other => return other,
                    }
                }
                Err(SegmentError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "could not find a free segment name",
                )))
            }
        }
    }

    fn create_named(name: &str, size: usize) -> Result<Self> {
        validate_name(name)?;
        if size == 0 {
            return Err(SegmentError::InvalidSize {
                name: name.to_string(),
                size,
            });
        }

        let file = shm_open(name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, size)?;

        if let Err(e) = file.set_len(size as u64) {
            drop(file);
            let _ = shm_unlink(name);
            return Err(SegmentError::from_os(e, name, size));
        }

        let mapping = match map(file, size) {
            Ok(mapping) => mapping,
            Err(e) => {
                let _ = shm_unlink(name);
                return Err(SegmentError::from_os(e, name, size));
            }
        };

        tracing::debug!(name = %name, size, "created shared memory segment");

        Ok(Self {
            name: name.to_string(),
            size,
            mapping: Some(mapping),
        })
    }

    /// Attach to an existing segment; the size is discovered from the object.
    pub fn open(name: &str) -> Result<Self> {
        validate_name(name)?;

        let file = shm_open(name, libc::O_RDWR, 0)?;
        let size = file
            .metadata()
            .map_err(|e| SegmentError::from_os(e, name, 0))?
            .len() as usize;

        if size == 0 {
            return Err(SegmentError::InvalidSize {
                name: name.to_string(),
                size,
            });
        }

        let mapping = map(file, size).map_err(|e| SegmentError::from_os(e, name, size))?;

        tracing::trace!(name = %name, size, "opened shared memory segment");

        Ok(Self {
            name: name.to_string(),
            size,
            mapping: Some(mapping),
        })
    }

    /// Remove the named object. Existing mappings stay valid until closed.
    pub fn unlink(name: &str) -> Result<()> {
        validate_name(name)?;
        shm_unlink(name)?;
        tracing::debug!(name = %name, "unlinked shared memory segment");
        Ok(())
    }

    /// Check whether a segment with this name exists.
    pub fn exists(name: &str) -> bool {
        match Self::open(name) {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// The segment name (without the leading `/`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the segment in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True once [`Segment::close`] has run.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.mapping.is_none()
    }

    /// Unmap the segment. Idempotent.
    pub fn close(&mut self) {
        if self.mapping.take().is_some() {
            tracing::trace!(name = %self.name, "closed shared memory segment");
        }
    }

    /// Copy `len` bytes starting at `offset` out of the segment.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` with the bytes starting at `offset`.
    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let src = self.ptr_at(offset, buf.len())?;
        // SAFETY: ptr_at checked that [offset, offset + len) lies in the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy `data` into the segment at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let dst = self.ptr_at(offset, data.len())?;
        // SAFETY: ptr_at checked that [offset, offset + len) lies in the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// View the 4 bytes at `offset` as an atomic word.
    ///
    /// The offset must be 4-byte aligned (mappings are page aligned).
    pub fn atomic_u32(&self, offset: usize) -> Result<&AtomicU32> {
        if !offset.is_multiple_of(std::mem::align_of::<AtomicU32>()) {
            return Err(SegmentError::Misaligned { offset });
        }
        let ptr = self.ptr_at(offset, std::mem::size_of::<AtomicU32>())?;
        // SAFETY: in bounds, aligned, and the mapping outlives &self.
        Ok(unsafe { &*(ptr as *const AtomicU32) })
    }

    fn ptr_at(&self, offset: usize, len: usize) -> Result<*mut u8> {
        let mapping = self
            .mapping
            .as_ref()
            .ok_or_else(|| SegmentError::Closed(self.name.clone()))?;

        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= mapping.size => {
                // SAFETY: offset <= size, so the result stays inside the mapping.
                Ok(unsafe { mapping.base_addr.add(offset) })
            }
            _ => Err(SegmentError::OutOfBounds {
                offset,
                len,
                size: mapping.size,
            }),
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// libc glue
// =============================================================================

fn c_name(name: &str) -> Result<CString> {
    CString::new(os_name(name)).map_err(|_| SegmentError::InvalidName {
        name: name.to_string(),
        reason: "name must not contain NUL bytes",
    })
}

fn shm_open(name: &str, oflag: libc::c_int, size: usize) -> Result<File> {
    let c_name = c_name(name)?;
    // SAFETY: c_name is a valid NUL-terminated string.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, 0o600 as libc::c_uint) };
    if fd < 0 {
        return Err(SegmentError::from_os(io::Error::last_os_error(), name, size));
    }
    // SAFETY: fd was just returned by shm_open and is owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}

fn shm_unlink(name: &str) -> Result<()> {
    let c_name = c_name(name)?;
    // SAFETY: c_name is a valid NUL-terminated string.
    let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
    if rc < 0 {
        return Err(SegmentError::from_os(io::Error::last_os_error(), name, 0));
    }
    Ok(())
}

fn map(file: File, size: usize) -> io::Result<Mapping> {
    // SAFETY: the fd is valid and sized to at least `size` bytes.
    let base_addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };

    if base_addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    Ok(Mapping {
        base_addr: base_addr as *mut u8,
        size,
        _file: file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> String {
        format!(
            "shmtest_{}_{}_{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_write_open_read() {
        let name = unique_name("rw");
        let seg = Segment::create(Some(&name), 128).unwrap();
        assert_eq!(seg.len(), 128);
        seg.write(10, b"shared").unwrap();

        let other = Segment::open(&name).unwrap();
        assert!(other.len() >= 128);
        assert_eq!(other.read(10, 6).unwrap(), b"shared");

        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn test_fresh_segment_is_zeroed() {
        let name = unique_name("zero");
        let seg = Segment::create(Some(&name), 64).unwrap();
        assert_eq!(seg.read(0, 64).unwrap(), vec![0u8; 64]);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let err = Segment::open(&unique_name("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_twice_is_already_exists() {
        let name = unique_name("dup");
        let _seg = Segment::create(Some(&name), 16).unwrap();
        let err = Segment::create(Some(&name), 16).unwrap_err();
        assert!(matches!(err, SegmentError::AlreadyExists(_)));
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = Segment::create(Some(&unique_name("empty")), 0).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidSize { .. }));
    }

    #[test]
    fn test_anonymous_create() {
        let seg = Segment::create(None, 32).unwrap();
        assert!(seg.name().starts_with("psm_"));
        assert!(Segment::exists(seg.name()));
        Segment::unlink(seg.name()).unwrap();
        assert!(!Segment::exists(seg.name()));
    }

    #[test]
    fn test_bounds_are_checked() {
        let name = unique_name("bounds");
        let seg = Segment::create(Some(&name), 16).unwrap();
        assert!(matches!(
            seg.write(12, b"toolong"),
            Err(SegmentError::OutOfBounds { .. })
        ));
        assert!(matches!(
            seg.read(usize::MAX, 2),
            Err(SegmentError::OutOfBounds { .. })
        ));
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn test_atomic_word_is_shared() {
        let name = unique_name("atomic");
        let a = Segment::create(Some(&name), 16).unwrap();
        let b = Segment::open(&name).unwrap();

        a.atomic_u32(4).unwrap().store(77, Ordering::Release);
        assert_eq!(b.atomic_u32(4).unwrap().load(Ordering::Acquire), 77);
        assert!(matches!(
            a.atomic_u32(2),
            Err(SegmentError::Misaligned { offset: 2 })
        ));

        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let name = unique_name("close");
        let mut seg = Segment::create(Some(&name), 16).unwrap();
        seg.close();
        seg.close();
        assert!(seg.is_closed());
        assert!(matches!(seg.read(0, 1), Err(SegmentError::Closed(_))));
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn test_unlink_missing_is_not_found() {
        let err = Segment::unlink(&unique_name("gone")).unwrap_err();
        assert!(err.is_not_found());
    }
}
