//! Named shared memory segments.
//!
//! A [`Segment`] is a fixed-size byte region backed by a POSIX shared memory
//! object (`shm_open` + `mmap`). Any process that knows the name can attach
//! to it; the region lives until someone calls [`Segment::unlink`], even after
//! every mapping is gone.
//!
//! # Names
//!
//! Names are given without the leading `/` that POSIX requires; the crate adds
//! it. When no name is supplied a random `psm_<uuid>` name is generated.
//!
//! ```no_run
//! use sharedobj_shm::Segment;
//!
//! let seg = Segment::create(Some("demo_segment"), 4096)?;
//! seg.write(0, b"hello")?;
//!
//! let other = Segment::open("demo_segment")?;
//! assert_eq!(other.read(0, 5)?, b"hello");
//!
//! Segment::unlink("demo_segment")?;
//! # Ok::<(), sharedobj_shm::SegmentError>(())
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]

mod error;
mod name;
mod segment;

pub use error::{Result, SegmentError};
pub use name::{MAX_NAME_LEN, generate_name, os_name, validate_name};
pub use segment::Segment;
