//! Log records: the closed set of mutations a container can publish.
//!
//! Every record is applied the same way by the writer (to its mirror, before
//! publishing) and by readers (when replaying), so replicas stay identical.
//! Anything that depends on local state, like removing by value, is resolved
//! into a positional record before it is logged.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::unhashable;
use crate::value::{Mapping, Value, clamp_index, normalize_index};

/// A published mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Seq(SeqOp),
    Queue(QueueOp),
    Map(MapOp),
    Set(SetOp),
}

/// Mutations shared by sequences and queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeqOp {
    Append(Value),
    Insert { index: i64, item: Value },
    /// Remove and return the item at the index (the last one by default).
    Pop(Option<i64>),
    Delete(i64),
    Assign { index: i64, item: Value },
    Reverse,
    Sort { reverse: bool },
    Clear,
}

/// Queue-only mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueOp {
    AppendLeft(Value),
    PopLeft,
    Rotate(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapOp {
    Assign { key: Value, item: Value },
    Delete(Value),
    Pop(Value),
    /// Remove the last (or, for ordered maps, first) entry.
    PopItem { last: bool },
    SetDefault { key: Value, item: Value },
    MoveToEnd { key: Value, last: bool },
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetOp {
    Add(Value),
    Discard(Value),
    Remove(Value),
    /// Remove the smallest member, so every replica pops the same one.
    Pop,
    Clear,
    DifferenceUpdate(Vec<BTreeSet<Value>>),
    IntersectionUpdate(Vec<BTreeSet<Value>>),
    SymmetricDifferenceUpdate(BTreeSet<Value>),
}

impl Op {
    /// Operation name for errors and tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Seq(op) => match op {
                SeqOp::Append(_) => "append",
                SeqOp::Insert { .. } => "insert",
                SeqOp::Pop(_) => "pop",
                SeqOp::Delete(_) => "delete",
                SeqOp::Assign { .. } => "set_item",
                SeqOp::Reverse => "reverse",
                SeqOp::Sort { .. } => "sort",
                SeqOp::Clear => "clear",
            },
            Op::Queue(op) => match op {
                QueueOp::AppendLeft(_) => "append_left",
                QueueOp::PopLeft => "pop_left",
                QueueOp::Rotate(_) => "rotate",
            },
            Op::Map(op) => match op {
                MapOp::Assign { .. } => "set_item",
                MapOp::Delete(_) => "delete",
                MapOp::Pop(_) => "pop",
                MapOp::PopItem { .. } => "pop_item",
                MapOp::SetDefault { .. } => "set_default",
                MapOp::MoveToEnd { .. } => "move_to_end",
                MapOp::Clear => "clear",
            },
            Op::Set(op) => match op {
                SetOp::Add(_) => "add",
                SetOp::Discard(_) => "discard",
                SetOp::Remove(_) => "remove",
                SetOp::Pop => "pop",
                SetOp::Clear => "clear",
                SetOp::DifferenceUpdate(_) => "difference_update",
                SetOp::IntersectionUpdate(_) => "intersection_update",
                SetOp::SymmetricDifferenceUpdate(_) => "symmetric_difference_update",
            },
        }
    }

    /// Apply the record to `target`, returning the removed or produced value
    /// for pops and lookups.
    ///
    /// On error `target` is left unchanged.
    pub fn apply(&self, target: &mut Value) -> Result<Option<Value>> {
        let name = self.name();
        match self {
            Op::Seq(op) => match target {
                Value::Seq(items) => apply_seq(op, items, name),
                Value::Queue(_) => apply_seq_to_queue(op, target, name),
                other => Err(Error::wrong_kind(name, other)),
            },
            Op::Queue(op) => match target {
                Value::Queue(q) => match op {
                    QueueOp::AppendLeft(item) => {
                        q.push_front(item.clone());
                        Ok(None)
                    }
                    QueueOp::PopLeft => q.pop_front().map(Some).ok_or(Error::Empty(name)),
                    QueueOp::Rotate(n) => {
                        q.rotate(*n);
                        Ok(None)
                    }
                },
                other => Err(Error::wrong_kind(name, other)),
            },
            Op::Map(op) => {
                let ordered = matches!(target, Value::OrderedMap(_));
                let kind = target.kind_name();
                match target.as_mapping_mut() {
                    Some(m) => apply_map(op, m, ordered, name),
                    None => Err(Error::WrongKind {
                        operation: name,
                        kind,
                    }),
                }
            }
            Op::Set(op) => match target {
                Value::Set(members) => apply_set(op, members, name),
                other => Err(Error::wrong_kind(name, other)),
            },
        }
    }
}

fn apply_seq(op: &SeqOp, items: &mut Vec<Value>, name: &'static str) -> Result<Option<Value>> {
    match op {
        SeqOp::Append(item) => {
            items.push(item.clone());
            Ok(None)
        }
        SeqOp::Insert { index, item } => {
            items.insert(clamp_index(*index, items.len()), item.clone());
            Ok(None)
        }
        SeqOp::Pop(index) => {
            if items.is_empty() {
                return Err(Error::Empty(name));
            }
            let at = index.unwrap_or(-1);
            let i = normalize_index(at, items.len()).ok_or(Error::IndexOutOfRange(at))?;
            Ok(Some(items.remove(i)))
        }
        SeqOp::Delete(index) => {
            let i = normalize_index(*index, items.len()).ok_or(Error::IndexOutOfRange(*index))?;
            Ok(Some(items.remove(i)))
        }
        SeqOp::Assign { index, item } => {
            let i = normalize_index(*index, items.len()).ok_or(Error::IndexOutOfRange(*index))?;
            Ok(Some(std::mem::replace(&mut items[i], item.clone())))
        }
        SeqOp::Reverse => {
            items.reverse();
            Ok(None)
        }
        SeqOp::Sort { reverse } => {
            if items.iter().any(|v| matches!(v, Value::Shared(_))) {
                return Err(Error::Unorderable);
            }
            if *reverse {
                items.sort_by(|a, b| b.cmp(a));
            } else {
                items.sort();
            }
            Ok(None)
        }
        SeqOp::Clear => {
            items.clear();
            Ok(None)
        }
    }
}

fn apply_seq_to_queue(op: &SeqOp, target: &mut Value, name: &'static str) -> Result<Option<Value>> {
    let Value::Queue(q) = target else {
        return Err(Error::wrong_kind(name, target));
    };
    match op {
        SeqOp::Append(item) => {
            q.push_back(item.clone());
            Ok(None)
        }
        SeqOp::Insert { index, item } => {
            if q.is_full() {
                return Err(Error::QueueFull(q.len()));
            }
            q.insert(clamp_index(*index, q.len()), item.clone());
            Ok(None)
        }
        SeqOp::Pop(None) => q.pop_back().map(Some).ok_or(Error::Empty(name)),
        SeqOp::Delete(index) => {
            let i = normalize_index(*index, q.len()).ok_or(Error::IndexOutOfRange(*index))?;
            Ok(q.remove(i))
        }
        SeqOp::Assign { index, item } => {
            let i = normalize_index(*index, q.len()).ok_or(Error::IndexOutOfRange(*index))?;
            Ok(q.replace(i, item.clone()))
        }
        SeqOp::Reverse => {
            q.reverse();
            Ok(None)
        }
        SeqOp::Clear => {
            q.clear();
            Ok(None)
        }
        SeqOp::Pop(Some(_)) | SeqOp::Sort { .. } => Err(Error::WrongKind {
            operation: name,
            kind: "queue",
        }),
    }
}

fn apply_map(op: &MapOp, m: &mut Mapping, ordered: bool, name: &'static str) -> Result<Option<Value>> {
    match op {
        MapOp::Assign { key, item } => {
            if !key.is_hashable() {
                return Err(unhashable(key));
            }
            Ok(m.insert(key.clone(), item.clone()))
        }
        MapOp::Delete(key) | MapOp::Pop(key) => m
            .remove(key)
            .map(Some)
            .ok_or_else(|| Error::KeyNotFound(key.clone())),
        MapOp::PopItem { last } => {
            if !last && !ordered {
                return Err(Error::WrongKind {
                    operation: name,
                    kind: "unordered map",
                });
            }
            let entry = if *last { m.pop_last() } else { m.pop_first() };
            entry
                .map(|(k, v)| Some(Value::Tuple(vec![k, v])))
                .ok_or(Error::Empty(name))
        }
        MapOp::SetDefault { key, item } => {
            if let Some(existing) = m.get(key) {
                return Ok(Some(existing.clone()));
            }
            if !key.is_hashable() {
                return Err(unhashable(key));
            }
            m.insert(key.clone(), item.clone());
            Ok(Some(item.clone()))
        }
        MapOp::MoveToEnd { key, last } => {
            if !ordered {
                return Err(Error::WrongKind {
                    operation: name,
                    kind: "unordered map",
                });
            }
            if m.move_to_end(key, *last) {
                Ok(None)
            } else {
                Err(Error::KeyNotFound(key.clone()))
            }
        }
        MapOp::Clear => {
            m.clear();
            Ok(None)
        }
    }
}

fn apply_set(op: &SetOp, members: &mut BTreeSet<Value>, name: &'static str) -> Result<Option<Value>> {
    match op {
        SetOp::Add(item) => {
            if !item.is_hashable() {
                return Err(unhashable(item));
            }
            members.insert(item.clone());
            Ok(None)
        }
        SetOp::Discard(item) => {
            members.remove(item);
            Ok(None)
        }
        SetOp::Remove(item) => {
            if members.remove(item) {
                Ok(None)
            } else {
                Err(Error::KeyNotFound(item.clone()))
            }
        }
        SetOp::Pop => members.pop_first().map(Some).ok_or(Error::Empty(name)),
        SetOp::Clear => {
            members.clear();
            Ok(None)
        }
        SetOp::DifferenceUpdate(others) => {
            members.retain(|m| !others.iter().any(|o| o.contains(m)));
            Ok(None)
        }
        SetOp::IntersectionUpdate(others) => {
            members.retain(|m| others.iter().all(|o| o.contains(m)));
            Ok(None)
        }
        SetOp::SymmetricDifferenceUpdate(other) => {
            if let Some(bad) = other.iter().find(|v| !v.is_hashable()) {
                return Err(unhashable(bad));
            }
            for item in other {
                if !members.remove(item) {
                    members.insert(item.clone());
                }
            }
            Ok(None)
        }
    }
}
