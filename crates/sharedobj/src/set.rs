//! Set operations.
//!
//! The `*_update` forms publish a single record; the plain forms only read
//! and return a new, unshared [`Value::Set`].

use std::collections::BTreeSet;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::kind::{Kind, unhashable};
use crate::object::SharedObject;
use crate::op::{Op, SetOp};
use crate::value::Value;

impl<C: Codec> SharedObject<C> {
    pub fn add(&self, item: impl Into<Value>) -> Result<()> {
        let item = item.into();
        self.write(|inner| {
            inner.require("add", is_set(&inner.kind))?;
            inner.record(Op::Set(SetOp::Add(item)))?;
            Ok(())
        })
    }

    /// Remove `item` if present.
    pub fn discard(&self, item: impl Into<Value>) -> Result<()> {
        let item = item.into();
        self.write(|inner| {
            inner.require("discard", is_set(&inner.kind))?;
            inner.record(Op::Set(SetOp::Discard(item)))?;
            Ok(())
        })
    }

    pub fn difference(&self, others: &[Value]) -> Result<Value> {
        let others = member_sets(others)?;
        let members = self.members("difference")?;
        Ok(Value::Set(
            members
                .into_iter()
                .filter(|m| !others.iter().any(|o| o.contains(m)))
                .collect(),
        ))
    }

    pub fn difference_update(&self, others: &[Value]) -> Result<()> {
        let others = member_sets(others)?;
        self.write(|inner| {
            inner.require("difference_update", is_set(&inner.kind))?;
            inner.record(Op::Set(SetOp::DifferenceUpdate(others)))?;
            Ok(())
        })
    }

    pub fn intersection(&self, others: &[Value]) -> Result<Value> {
        let others = member_sets(others)?;
        let members = self.members("intersection")?;
        Ok(Value::Set(
            members
                .into_iter()
                .filter(|m| others.iter().all(|o| o.contains(m)))
                .collect(),
        ))
    }

    pub fn intersection_update(&self, others: &[Value]) -> Result<()> {
        let others = member_sets(others)?;
        self.write(|inner| {
            inner.require("intersection_update", is_set(&inner.kind))?;
            inner.record(Op::Set(SetOp::IntersectionUpdate(others)))?;
            Ok(())
        })
    }

    pub fn symmetric_difference(&self, other: &Value) -> Result<Value> {
        let other = member_set(other)?;
        let members = self.members("symmetric_difference")?;
        Ok(Value::Set(
            members.symmetric_difference(&other).cloned().collect(),
        ))
    }

    pub fn symmetric_difference_update(&self, other: &Value) -> Result<()> {
        let other = member_set(other)?;
        self.write(|inner| {
            inner.require("symmetric_difference_update", is_set(&inner.kind))?;
            inner.record(Op::Set(SetOp::SymmetricDifferenceUpdate(other)))?;
            Ok(())
        })
    }

    pub fn union(&self, others: &[Value]) -> Result<Value> {
        let mut members = self.members("union")?;
        for other in member_sets(others)? {
            members.extend(other);
        }
        Ok(Value::Set(members))
    }

    pub fn is_subset(&self, other: &Value) -> Result<bool> {
        let other = member_set(other)?;
        Ok(self.members("is_subset")?.is_subset(&other))
    }

    pub fn is_superset(&self, other: &Value) -> Result<bool> {
        let other = member_set(other)?;
        Ok(self.members("is_superset")?.is_superset(&other))
    }

    pub fn is_disjoint(&self, other: &Value) -> Result<bool> {
        let other = member_set(other)?;
        Ok(self.members("is_disjoint")?.is_disjoint(&other))
    }

    fn members(&self, operation: &'static str) -> Result<BTreeSet<Value>> {
        self.read(|inner| match &inner.data {
            Value::Set(members) => Ok(members.clone()),
            other => Err(Error::wrong_kind(operation, other)),
        })
    }
}

fn is_set(kind: &Kind) -> bool {
    matches!(kind, Kind::Set)
}

fn member_set(value: &Value) -> Result<BTreeSet<Value>> {
    let elements = value
        .elements()
        .ok_or_else(|| Error::UnsupportedKind(format!("{} is not iterable", value.kind_name())))?;
    elements
        .into_iter()
        .map(|e| if e.is_hashable() { Ok(e) } else { Err(unhashable(&e)) })
        .collect()
}

fn member_sets(values: &[Value]) -> Result<Vec<BTreeSet<Value>>> {
    values.iter().map(member_set).collect()
}
