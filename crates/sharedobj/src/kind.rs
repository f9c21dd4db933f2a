//! Container kinds and the descriptor stored in the control block.

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, Encoding};
use crate::error::{Error, Result};
use crate::value::{Mapping, Queue, Value};

/// The shape of a shared container.
///
/// Every attached process rebuilds an empty instance of the kind and then
/// replays the log on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Kind {
    Seq,
    Queue { max_len: Option<usize> },
    Set,
    Map,
    DefaultMap { default: Value },
    OrderedMap,
}

impl Kind {
    /// Classify `value`, rejecting scalars and unhashable keys or members.
    pub fn of(value: &Value) -> Result<Self> {
        match value {
            Value::Seq(_) => Ok(Kind::Seq),
            Value::Queue(q) => Ok(Kind::Queue {
                max_len: q.max_len(),
            }),
            Value::Set(members) => {
                if let Some(bad) = members.iter().find(|m| !m.is_hashable()) {
                    return Err(unhashable(bad));
                }
                Ok(Kind::Set)
            }
            Value::Map(m) => check_keys(m).map(|_| Kind::Map),
            Value::OrderedMap(m) => check_keys(m).map(|_| Kind::OrderedMap),
            Value::DefaultMap(d) => {
                if d.default.contains_shared() {
                    return Err(Error::UnsupportedKind(
                        "shared references cannot be stored directly".to_string(),
                    ));
                }
                check_keys(&d.entries).map(|_| Kind::DefaultMap {
                    default: (*d.default).clone(),
                })
            }
            other => Err(Error::UnsupportedKind(format!(
                "{} is not a shareable container",
                other.kind_name()
            ))),
        }
    }

    /// A fresh, empty container of this kind.
    pub fn empty(&self) -> Value {
        match self {
            Kind::Seq => Value::Seq(Vec::new()),
            Kind::Queue { max_len } => Value::Queue(Queue::new(*max_len)),
            Kind::Set => Value::Set(Default::default()),
            Kind::Map => Value::Map(Mapping::new()),
            Kind::DefaultMap { default } => Value::default_map(default.clone(), Vec::<(Value, Value)>::new()),
            Kind::OrderedMap => Value::OrderedMap(Mapping::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kind::Seq => "seq",
            Kind::Queue { .. } => "queue",
            Kind::Set => "set",
            Kind::Map => "map",
            Kind::DefaultMap { .. } => "default_map",
            Kind::OrderedMap => "ordered_map",
        }
    }

    /// Sets hold hashable values only, so they never host nested containers.
    pub fn allows_nesting(&self) -> bool {
        !matches!(self, Kind::Set)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Kind::Seq | Kind::Queue { .. })
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Kind::Map | Kind::DefaultMap { .. } | Kind::OrderedMap)
    }
}

fn check_keys(m: &Mapping) -> Result<()> {
    match m.keys().find(|k| !k.is_hashable()) {
        Some(bad) => Err(unhashable(bad)),
        None => Ok(()),
    }
}

pub(crate) fn unhashable(value: &Value) -> Error {
    Error::UnsupportedKind(format!("{} is not hashable", value.kind_name()))
}

/// Length of the encoding tag written in front of the descriptor.
const ENCODING_TAG_LEN: usize = 2;

/// What the control block records about a container.
///
/// Stored as `[u16 LE encoding][codec payload]`, so a handle built with a
/// different codec is refused before it tries to decode anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub kind: Kind,
    /// Name of the registry shared by a nested tree, if any.
    pub registry: Option<String>,
}

impl Descriptor {
    pub fn encode<C: Codec>(&self) -> Result<Vec<u8>> {
        let mut bytes = u16::from(C::ENCODING).to_le_bytes().to_vec();
        bytes.extend(C::encode(self).map_err(Error::codec)?);
        Ok(bytes)
    }

    pub fn decode<C: Codec>(bytes: &[u8]) -> Result<Self> {
        let (tag, payload) = match bytes.split_first_chunk::<ENCODING_TAG_LEN>() {
            Some((tag, payload)) => (u16::from_le_bytes(*tag), payload),
            None => return Err(Error::codec("descriptor is missing its encoding tag")),
        };
        let found = Encoding::try_from(tag).map_err(Error::codec)?;
        if found != C::ENCODING {
            return Err(Error::EncodingMismatch {
                expected: C::ENCODING,
                found,
            });
        }
        C::decode(payload).map_err(Error::codec)
    }
}
