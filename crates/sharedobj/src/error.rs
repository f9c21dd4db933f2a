use std::fmt;

use sharedobj_shm::SegmentError;

use crate::Value;
use crate::codec::Encoding;

/// Errors from shared container operations.
#[derive(Debug)]
pub enum Error {
    /// Creation was requested without an initial value.
    MissingValue,
    /// Attaching was requested without a name.
    MissingName,
    /// The value is not a container kind that can be shared, or an element
    /// cannot be used as a set member / mapping key.
    UnsupportedKind(String),
    /// The kind descriptor does not fit in the control block.
    DescriptorTooLarge { required: usize, available: usize },
    /// No container (or segment) exists under this name.
    NotFound(String),
    /// The requested name is already taken.
    AlreadyExists(String),
    /// A snapshot reload was requested but none is available.
    NoNewSnapshot,
    /// The system could not provide shared memory of the requested size.
    StorageExhausted { name: String, size: usize },
    /// A log record points outside the log or does not decode.
    CorruptLog { position: u32, reason: String },
    /// Encoding or decoding failed.
    Codec(String),
    /// The container was created with a different codec than this handle's.
    EncodingMismatch { expected: Encoding, found: Encoding },
    /// A nested reference leads back to a container that encloses it.
    CyclicReference(String),
    /// The handle was closed.
    Closed(String),
    /// Any other segment failure.
    Segment(SegmentError),

    /// The operation does not apply to this container kind.
    WrongKind {
        operation: &'static str,
        kind: &'static str,
    },
    IndexOutOfRange(i64),
    KeyNotFound(Value),
    ValueNotFound(Value),
    /// Pop from an empty container.
    Empty(&'static str),
    /// Insert into a queue already at its maximum length.
    QueueFull(usize),
    /// Sort of a sequence holding nested containers.
    Unorderable,
}

impl Error {
    pub(crate) fn codec(err: impl fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }

    pub(crate) fn wrong_kind(operation: &'static str, value: &Value) -> Self {
        Self::WrongKind {
            operation,
            kind: value.kind_name(),
        }
    }

    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue => write!(f, "creating a shared container requires a value"),
            Self::MissingName => write!(f, "attaching to a shared container requires a name"),
            Self::UnsupportedKind(what) => write!(f, "unsupported kind: {}", what),
            Self::DescriptorTooLarge {
                required,
                available,
            } => write!(
                f,
                "kind descriptor needs {} bytes but the control block has {}",
                required, available
            ),
            Self::NotFound(name) => write!(f, "no shared container named {:?}", name),
            Self::AlreadyExists(name) => write!(f, "shared container {:?} already exists", name),
            Self::NoNewSnapshot => write!(f, "no new snapshot to load"),
            Self::StorageExhausted { name, size } => {
                write!(f, "cannot allocate {} bytes of shared memory for {:?}", size, name)
            }
            Self::CorruptLog { position, reason } => {
                write!(f, "corrupt log record at position {}: {}", position, reason)
            }
            Self::Codec(msg) => write!(f, "codec error: {}", msg),
            Self::EncodingMismatch { expected, found } => write!(
                f,
                "container is encoded with {} but this handle uses {}",
                found, expected
            ),
            Self::CyclicReference(name) => {
                write!(f, "nested reference to {:?} forms a cycle", name)
            }
            Self::Closed(name) => write!(f, "shared container {:?} is closed", name),
            Self::Segment(e) => write!(f, "segment error: {}", e),
            Self::WrongKind { operation, kind } => {
                write!(f, "{} is not supported on a {}", operation, kind)
            }
            Self::IndexOutOfRange(i) => write!(f, "index {} out of range", i),
            Self::KeyNotFound(key) => write!(f, "key not found: {}", key),
            Self::ValueNotFound(value) => write!(f, "value not found: {}", value),
            Self::Empty(operation) => write!(f, "{} from an empty container", operation),
            Self::QueueFull(max_len) => {
                write!(f, "queue already at its maximum length of {}", max_len)
            }
            Self::Unorderable => write!(f, "sequences holding nested containers cannot be sorted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Segment(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SegmentError> for Error {
    fn from(e: SegmentError) -> Self {
        match e {
            SegmentError::NotFound(name) => Self::NotFound(name),
            SegmentError::AlreadyExists(name) => Self::AlreadyExists(name),
            SegmentError::Exhausted { name, size } => Self::StorageExhausted { name, size },
            SegmentError::Closed(name) => Self::Closed(name),
            other => Self::Segment(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
