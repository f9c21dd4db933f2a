#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod codec;
mod config;
mod error;
mod kind;
mod layout;
mod log;
mod mapping;
mod object;
mod op;
mod registry;
mod sequence;
mod set;
mod snapshot;
mod value;

pub use codec::{Codec, Encoding, JsonCodec, PostcardCodec, UnknownEncoding};
pub use config::{Config, Options, WriterLock};
pub use error::{Error, Result};
pub use kind::{Descriptor, Kind};
pub use layout::{
    ControlBlock, DEFAULT_CONTROL_SIZE, DESCRIPTOR_LEN_OFFSET, DESCRIPTOR_OFFSET, NESTED_OFFSET,
    SNAPSHOT_COUNTER_OFFSET, SNAPSHOT_NAME_LEN, SNAPSHOT_NAME_OFFSET, STREAM_POSITION_OFFSET,
};
pub use log::{DEFAULT_LOG_SIZE, OperationLog, RECORD_HEADER_LEN, log_name};
pub use object::{Element, SharedObject};
pub use op::{MapOp, Op, QueueOp, SeqOp, SetOp};
pub use registry::registry_name;
pub use value::{DefaultMap, Mapping, Queue, Value};
