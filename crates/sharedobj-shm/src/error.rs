use std::io;

/// Errors from segment operations.
#[derive(Debug)]
pub enum SegmentError {
    /// No segment exists under this name.
    NotFound(String),
    /// A segment with this name already exists.
    AlreadyExists(String),
    /// The system could not provide a region of the requested size.
    Exhausted { name: String, size: usize },
    /// The name is not usable as a POSIX shared memory name.
    InvalidName {
        name: String,
        reason: &'static str,
    },
    /// Segments must be at least one byte long.
    InvalidSize { name: String, size: usize },
    /// An access fell outside the mapped region.
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    /// Atomic access at an offset that is not 4-byte aligned.
    Misaligned { offset: usize },
    /// The mapping was already released.
    Closed(String),
    /// Any other OS error.
    Io(io::Error),
}

impl SegmentError {
    /// Classify an OS error raised while working on `name`.
    pub(crate) fn from_os(err: io::Error, name: &str, size: usize) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(name.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(name.to_string()),
            _ => match err.raw_os_error() {
                Some(libc::ENOSPC) | Some(libc::ENOMEM) | Some(libc::EFBIG) => Self::Exhausted {
                    name: name.to_string(),
                    size,
                },
                _ => Self::Io(err),
            },
        }
    }

    /// True for [`SegmentError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "no shared memory segment named {:?}", name),
            Self::AlreadyExists(name) => {
                write!(f, "shared memory segment {:?} already exists", name)
            }
            Self::Exhausted { name, size } => write!(
                f,
                "cannot allocate {} bytes for shared memory segment {:?}",
                size, name
            ),
            Self::InvalidName { name, reason } => {
                write!(f, "invalid segment name {:?}: {}", name, reason)
            }
            Self::InvalidSize { name, size } => {
                write!(f, "invalid size {} for segment {:?}", size, name)
            }
            Self::OutOfBounds { offset, len, size } => write!(
                f,
                "access of {} bytes at offset {} is outside a {} byte segment",
                len, offset, size
            ),
            Self::Misaligned { offset } => {
                write!(f, "offset {} is not aligned for atomic access", offset)
            }
            Self::Closed(name) => write!(f, "segment {:?} is closed", name),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SegmentError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T, E = SegmentError> = std::result::Result<T, E>;
