//! Map operations, including ordered and default-valued maps.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::kind::{Kind, unhashable};
use crate::object::{Element, SharedObject};
use crate::op::{MapOp, Op};
use crate::value::Value;

impl<C: Codec> SharedObject<C> {
    /// Value under `key`, or `default` when missing. Never inserts, even on
    /// a default-valued map.
    pub fn get(&self, key: &Value, default: Option<Value>) -> Result<Option<Element<C>>> {
        self.read(|inner| {
            inner.require("get", inner.kind.is_mapping())?;
            match inner.data.as_mapping().and_then(|m| m.get(key)).cloned() {
                Some(found) => inner.element(found).map(Some),
                None => Ok(default.map(Element::Value)),
            }
        })
    }

    pub fn keys(&self) -> Result<Vec<Value>> {
        self.read(|inner| {
            inner.require("keys", inner.kind.is_mapping())?;
            Ok(inner
                .data
                .as_mapping()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    pub fn values(&self) -> Result<Vec<Element<C>>> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn items(&self) -> Result<Vec<(Value, Element<C>)>> {
        self.read(|inner| {
            inner.require("items", inner.kind.is_mapping())?;
            let pairs: Vec<(Value, Value)> = inner
                .data
                .as_mapping()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            pairs
                .into_iter()
                .map(|(key, value)| -> Result<(Value, Element<C>)> {
                    Ok((key, inner.element(value)?))
                })
                .collect()
        })
    }

    /// Value under `key`, inserting `item` first if the key is missing.
    pub fn set_default(&self, key: impl Into<Value>, item: impl Into<Value>) -> Result<Element<C>> {
        let (key, item) = (key.into(), item.into());
        self.write(|inner| {
            inner.require("set_default", inner.kind.is_mapping())?;
            if let Some(found) = inner.data.as_mapping().and_then(|m| m.get(&key)).cloned() {
                return inner.element(found);
            }
            if !key.is_hashable() {
                return Err(unhashable(&key));
            }
            let item = inner.promote(item)?;
            let stored = inner.record(Op::Map(MapOp::SetDefault { key, item }))?;
            inner.element(stored.unwrap_or(Value::Null))
        })
    }

    /// Remove `key` and return its value; `default` (if given) when missing.
    pub fn pop_key(&self, key: &Value, default: Option<Value>) -> Result<Element<C>> {
        self.write(|inner| {
            inner.require("pop_key", inner.kind.is_mapping())?;
            let present = inner.data.as_mapping().is_some_and(|m| m.contains_key(key));
            if !present {
                return default
                    .map(Element::Value)
                    .ok_or_else(|| Error::KeyNotFound(key.clone()));
            }
            let popped = inner.record(Op::Map(MapOp::Pop(key.clone())))?;
            inner.element(popped.unwrap_or(Value::Null))
        })
    }

    /// Remove the most recently inserted entry, or with `last == false` the
    /// oldest one (ordered maps only).
    pub fn pop_item(&self, last: bool) -> Result<(Value, Element<C>)> {
        self.write(|inner| {
            inner.require("pop_item", inner.kind.is_mapping())?;
            let popped = inner.record(Op::Map(MapOp::PopItem { last }))?;
            let Some(Value::Tuple(mut pair)) = popped else {
                return Err(Error::Empty("pop_item"));
            };
            let value = pair.pop().unwrap_or(Value::Null);
            let key = pair.pop().unwrap_or(Value::Null);
            Ok((key, inner.element(value)?))
        })
    }

    /// Move `key` to the back (or with `last == false` the front) of an
    /// ordered map.
    pub fn move_to_end(&self, key: &Value, last: bool) -> Result<()> {
        self.write(|inner| {
            inner.require("move_to_end", matches!(inner.kind, Kind::OrderedMap))?;
            inner.record(Op::Map(MapOp::MoveToEnd {
                key: key.clone(),
                last,
            }))?;
            Ok(())
        })
    }

    /// The fill value of a default-valued map.
    pub fn default_value(&self) -> Option<Value> {
        match self.kind() {
            Kind::DefaultMap { default } => Some(default),
            _ => None,
        }
    }
}
