//! The dynamic value model stored in shared containers.
//!
//! [`Value`] is what travels through the codec: log records, snapshots and
//! kind descriptors are all built from it. Container variants double as the
//! in-process mirror of a shared container.

use std::cmp::Ordering;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value that can live in (or be) a shared container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    /// Immutable, hashable sequence.
    Tuple(Vec<Value>),
    /// Growable sequence.
    Seq(Vec<Value>),
    /// Double-ended queue with an optional length bound.
    Queue(Queue),
    /// Set of hashable values.
    Set(BTreeSet<Value>),
    /// Insertion-ordered mapping.
    Map(Mapping),
    /// Mapping that fills in a default for missing keys on indexing.
    DefaultMap(DefaultMap),
    /// Mapping with explicit end manipulation (`move_to_end`, `pop_item(first)`).
    OrderedMap(Mapping),
    /// Reference, by name, to a nested shared container.
    Shared(String),
}

impl Value {
    /// Build a [`Value::Seq`].
    pub fn seq<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }

    /// Build a [`Value::Tuple`].
    pub fn tuple<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Build a [`Value::Queue`] holding at most `max_len` items.
    ///
    /// Like appending one by one, extra items push the oldest ones out.
    pub fn queue<I, T>(items: I, max_len: Option<usize>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let mut queue = Queue::new(max_len);
        for item in items {
            queue.push_back(item.into());
        }
        Value::Queue(queue)
    }

    /// Build a [`Value::Set`].
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    /// Build a [`Value::Map`].
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Map(Mapping::from_pairs(entries))
    }

    /// Build a [`Value::OrderedMap`].
    pub fn ordered_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::OrderedMap(Mapping::from_pairs(entries))
    }

    /// Build a [`Value::DefaultMap`] whose missing keys read as `default`.
    pub fn default_map<I, K, V>(default: impl Into<Value>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::DefaultMap(DefaultMap {
            default: Box::new(default.into()),
            entries: Mapping::from_pairs(entries),
        })
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::Seq(_) => "seq",
            Value::Queue(_) => "queue",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::DefaultMap(_) => "default_map",
            Value::OrderedMap(_) => "ordered_map",
            Value::Shared(_) => "shared",
        }
    }

    /// True for the mutable container variants.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Seq(_)
                | Value::Queue(_)
                | Value::Set(_)
                | Value::Map(_)
                | Value::DefaultMap(_)
                | Value::OrderedMap(_)
        )
    }

    /// True if the value may be a set element or a mapping key.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Str(_) | Value::Bytes(_) => true,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => false,
        }
    }

    /// The mapping entries of any mapping variant.
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Map(m) | Value::OrderedMap(m) => Some(m),
            Value::DefaultMap(d) => Some(&d.entries),
            _ => None,
        }
    }

    pub(crate) fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Value::Map(m) | Value::OrderedMap(m) => Some(m),
            Value::DefaultMap(d) => Some(&mut d.entries),
            _ => None,
        }
    }

    /// Number of elements of a container; `None` for scalars.
    pub fn container_len(&self) -> Option<usize> {
        match self {
            Value::Tuple(items) | Value::Seq(items) => Some(items.len()),
            Value::Queue(q) => Some(q.len()),
            Value::Set(s) => Some(s.len()),
            Value::Str(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            other => other.as_mapping().map(Mapping::len),
        }
    }

    /// Iterate the elements of anything iterable. Mappings yield their keys.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Tuple(items) | Value::Seq(items) => Some(items.clone()),
            Value::Queue(q) => Some(q.iter().cloned().collect()),
            Value::Set(s) => Some(s.iter().cloned().collect()),
            other => other.as_mapping().map(|m| m.keys().cloned().collect()),
        }
    }

    /// Names of the shared containers referenced directly by this value.
    pub fn shared_refs(&self) -> Vec<&str> {
        let items: Box<dyn Iterator<Item = &Value>> = match self {
            Value::Seq(items) | Value::Tuple(items) => Box::new(items.iter()),
            Value::Queue(q) => Box::new(q.iter()),
            Value::Set(s) => Box::new(s.iter()),
            Value::Shared(name) => return vec![name.as_str()],
            other => match other.as_mapping() {
                Some(m) => Box::new(m.values()),
                None => return Vec::new(),
            },
        };
        items
            .filter_map(|v| match v {
                Value::Shared(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True if a shared reference appears anywhere inside this value,
    /// including map keys, the default of a default-valued map, and nested
    /// tuples.
    pub fn contains_shared(&self) -> bool {
        match self {
            Value::Shared(_) => true,
            Value::Seq(items) | Value::Tuple(items) => items.iter().any(Value::contains_shared),
            Value::Queue(q) => q.iter().any(Value::contains_shared),
            Value::Set(s) => s.iter().any(Value::contains_shared),
            Value::DefaultMap(d) => {
                d.default.contains_shared()
                    || d.entries
                        .iter()
                        .any(|(k, v)| k.contains_shared() || v.contains_shared())
            }
            Value::Map(m) | Value::OrderedMap(m) => m
                .iter()
                .any(|(k, v)| k.contains_shared() || v.contains_shared()),
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Str(_) | Value::Bytes(_) => false,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Str(_) => 3,
            Value::Bytes(_) => 4,
            Value::Tuple(_) => 5,
            Value::Seq(_) => 6,
            Value::Queue(_) => 7,
            Value::Set(_) => 8,
            Value::Map(_) | Value::DefaultMap(_) | Value::OrderedMap(_) => 9,
            Value::Shared(_) => 10,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) | (Value::Seq(a), Value::Seq(b)) => a.cmp(b),
            (Value::Queue(a), Value::Queue(b)) => a.iter().cmp(b.iter()),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Shared(a), Value::Shared(b)) => a.cmp(b),
            _ => match (self.as_mapping(), other.as_mapping()) {
                // All mapping flavours compare by content, ignoring insertion order.
                (Some(a), Some(b)) => a.canonical().cmp(&b.canonical()),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes(bytes) => {
                f.write_str("b\"")?;
                for byte in bytes {
                    write!(f, "{}", std::ascii::escape_default(*byte))?;
                }
                f.write_str("\"")
            }
            Value::Tuple(items) => write_list(f, "(", items.iter(), ")"),
            Value::Seq(items) => write_list(f, "[", items.iter(), "]"),
            Value::Queue(q) => {
                write_list(f, "queue[", q.iter(), "]")?;
                if let Some(max_len) = q.max_len() {
                    write!(f, " (max {})", max_len)?;
                }
                Ok(())
            }
            Value::Set(s) => write_list(f, "{", s.iter(), "}"),
            Value::Map(m) => write_entries(f, "{", m, "}"),
            Value::OrderedMap(m) => write_entries(f, "ordered{", m, "}"),
            Value::DefaultMap(d) => {
                write_entries(f, "{", &d.entries, "}")?;
                write!(f, " (default {})", d.default)
            }
            Value::Shared(name) => write!(f, "<shared {}>", name),
        }
    }
}

fn write_list<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

fn write_entries(f: &mut fmt::Formatter<'_>, open: &str, m: &Mapping, close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, (k, v)) in m.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", k, v)?;
    }
    f.write_str(close)
}

// =============================================================================
// Queue
// =============================================================================

/// Double-ended queue with an optional maximum length.
///
/// When full, pushing on one end drops an item from the other end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Queue {
    items: VecDeque<Value>,
    max_len: Option<usize>,
}

impl Queue {
    pub fn new(max_len: Option<usize>) -> Self {
        Self {
            items: VecDeque::new(),
            max_len,
        }
    }

    #[inline]
    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when another push would evict an item.
    pub fn is_full(&self) -> bool {
        self.max_len.is_some_and(|max| self.items.len() >= max)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.items.iter_mut()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.items.into()
    }

    /// Push on the right; returns the item evicted from the left, if any.
    pub fn push_back(&mut self, item: Value) -> Option<Value> {
        if self.max_len == Some(0) {
            return Some(item);
        }
        let evicted = if self.is_full() {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Push on the left; returns the item evicted from the right, if any.
    pub fn push_front(&mut self, item: Value) -> Option<Value> {
        if self.max_len == Some(0) {
            return Some(item);
        }
        let evicted = if self.is_full() {
            self.items.pop_back()
        } else {
            None
        };
        self.items.push_front(item);
        evicted
    }

    pub fn pop_back(&mut self) -> Option<Value> {
        self.items.pop_back()
    }

    pub fn pop_front(&mut self) -> Option<Value> {
        self.items.pop_front()
    }

    /// Insert at `index`; the caller has checked that the queue is not full.
    pub(crate) fn insert(&mut self, index: usize, item: Value) {
        self.items.insert(index, item);
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<Value> {
        self.items.remove(index)
    }

    pub(crate) fn replace(&mut self, index: usize, item: Value) -> Option<Value> {
        self.items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, item))
    }

    /// Rotate `n` steps to the right (left when negative).
    pub fn rotate(&mut self, n: i64) {
        let len = self.items.len();
        if len == 0 {
            return;
        }
        let steps = n.rem_euclid(len as i64) as usize;
        self.items.rotate_right(steps);
    }

    pub fn reverse(&mut self) {
        self.items.make_contiguous().reverse();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// Insertion-ordered association list.
///
/// Replacing an existing key keeps its position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: Vec<(Value, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let mut mapping = Self::new();
        for (k, v) in entries {
            mapping.insert(k.into(), v.into());
        }
        mapping
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    /// Insert or replace; returns the previous value.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop()
    }

    pub fn pop_first(&mut self) -> Option<(Value, Value)> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Move `key` to the back (or front); false if the key is missing.
    pub fn move_to_end(&mut self, key: &Value, last: bool) -> bool {
        let Some(i) = self.position(key) else {
            return false;
        };
        let entry = self.entries.remove(i);
        if last {
            self.entries.push(entry);
        } else {
            self.entries.insert(0, entry);
        }
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    pub fn into_pairs(self) -> Vec<(Value, Value)> {
        self.entries
    }

    /// Entries sorted by key, for order-insensitive comparison.
    fn canonical(&self) -> Vec<(&Value, &Value)> {
        let mut sorted: Vec<_> = self.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        sorted
    }
}

/// A mapping plus the value missing keys are filled with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultMap {
    pub default: Box<Value>,
    pub entries: Mapping,
}

// =============================================================================
// Index helpers
// =============================================================================

/// Resolve a possibly negative index against `len`; `None` when out of range.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    if (0..len).contains(&i) {
        Some(i as usize)
    } else {
        None
    }
}

/// Clamp a possibly negative insertion / slice bound into `0..=len`.
pub(crate) fn clamp_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let i = if index < 0 { (index + len).max(0) } else { index.min(len) };
    i as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_equality_ignores_order_and_flavour() {
        let a = Value::map([(1, 1), (2, 2)]);
        let b = Value::ordered_map([(2, 2), (1, 1)]);
        let c = Value::default_map(0, [(1, 1), (2, 2)]);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, Value::map([(1, 1)]));
    }

    #[test]
    fn test_seq_and_queue_are_distinct() {
        assert_ne!(Value::seq([1, 2]), Value::queue([1, 2], None));
        assert_eq!(Value::queue([1, 2], Some(5)), Value::queue([1, 2], None));
    }

    #[test]
    fn test_hashable() {
        assert!(Value::from(1).is_hashable());
        assert!(Value::tuple([1, 2]).is_hashable());
        assert!(!Value::tuple([Value::seq([1])]).is_hashable());
        assert!(!Value::seq([1]).is_hashable());
        assert!(!Value::Shared("x".into()).is_hashable());
    }

    #[test]
    fn test_queue_bounds() {
        let mut q = Queue::new(Some(2));
        assert_eq!(q.push_back(1.into()), None);
        assert_eq!(q.push_back(2.into()), None);
        assert_eq!(q.push_back(3.into()), Some(Value::Int(1)));
        assert_eq!(q.push_front(0.into()), Some(Value::Int(3)));
        assert_eq!(Value::Queue(q), Value::queue([0, 2], None));
    }

    #[test]
    fn test_queue_rotate() {
        let mut q = Queue::new(None);
        for i in 0..4 {
            q.push_back(i.into());
        }
        q.rotate(1);
        assert_eq!(Value::Queue(q.clone()), Value::queue([3, 0, 1, 2], None));
        q.rotate(-2);
        assert_eq!(Value::Queue(q), Value::queue([1, 2, 3, 0], None));
    }

    #[test]
    fn test_mapping_keeps_insertion_order() {
        let mut m = Mapping::new();
        m.insert("b".into(), 1.into());
        m.insert("a".into(), 2.into());
        m.insert("b".into(), 3.into());
        let keys: Vec<_> = m.keys().cloned().collect();
        assert_eq!(keys, vec![Value::from("b"), Value::from("a")]);
        assert_eq!(m.get(&"b".into()), Some(&Value::Int(3)));

        assert!(m.move_to_end(&"b".into(), true));
        assert_eq!(m.pop_first(), Some(("a".into(), 2.into())));
        assert!(!m.move_to_end(&"zz".into(), false));
    }

    #[test]
    fn test_index_helpers() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(clamp_index(10, 3), 3);
        assert_eq!(clamp_index(-10, 3), 0);
        assert_eq!(clamp_index(-1, 3), 2);
    }

    #[test]
    fn test_shared_refs() {
        let v = Value::seq([
            Value::from(1),
            Value::Shared("a".into()),
            Value::Shared("b".into()),
        ]);
        assert_eq!(v.shared_refs(), vec!["a", "b"]);
        let m = Value::map([(1, Value::Shared("c".into()))]);
        assert_eq!(m.shared_refs(), vec!["c"]);
    }

    #[test]
    fn test_contains_shared_looks_inside() {
        let shared = Value::Shared("a".into());
        assert!(shared.contains_shared());
        assert!(Value::tuple([Value::from(1), shared.clone()]).contains_shared());
        assert!(Value::seq([Value::tuple([shared.clone()])]).contains_shared());
        assert!(Value::map([(Value::tuple([shared.clone()]), 1)]).contains_shared());
        assert!(Value::default_map(shared.clone(), Vec::<(Value, Value)>::new()).contains_shared());
        assert!(Value::queue([Value::seq([shared])], None).contains_shared());

        assert!(!Value::seq([Value::tuple([1, 2]), Value::set([3])]).contains_shared());
        assert!(!Value::from("a").contains_shared());
    }

    #[test]
    fn test_display() {
        let v = Value::seq([Value::from(0), Value::seq([2, 2]), Value::from("x")]);
        assert_eq!(v.to_string(), "[0, [2, 2], \"x\"]");
        assert_eq!(Value::queue([1], Some(3)).to_string(), "queue[1] (max 3)");
    }
}
